pub mod credits;
pub mod letter;
pub mod research;
