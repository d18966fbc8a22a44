pub mod contracts;
pub mod health;
pub mod rewards;
pub mod session;
