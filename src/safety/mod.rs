pub mod critical;
pub mod lock;
