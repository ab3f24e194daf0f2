mod chat;
mod product;
mod review;
mod user;

pub use chat::*;
pub use product::*;
pub use review::*;
pub use user::*;
