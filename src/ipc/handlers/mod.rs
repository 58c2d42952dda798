pub mod core;
pub mod marks_csv;
pub mod promotion;
pub mod records;
pub mod results;
pub mod stars;
