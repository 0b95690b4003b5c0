pub mod quote;
pub mod ratio;
