pub mod actor;
pub mod design;
pub mod manufacturer;
pub mod order;
pub mod quote;
pub mod review;
