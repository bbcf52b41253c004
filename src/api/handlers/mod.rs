pub mod action;
pub use self::action::action;

pub mod health;
pub use self::health::health;
