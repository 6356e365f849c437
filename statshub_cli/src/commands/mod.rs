pub mod notify;
pub mod serve;
pub mod simulate;
pub mod validate;
