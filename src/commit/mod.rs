pub mod ops;
pub mod transactor;
