pub mod gateway;
pub mod mock;
pub mod retcode;
pub mod session;
pub mod terminal;
