pub mod account;
pub mod cart;
pub mod catalog;
pub mod conversation;
pub mod faq;
pub mod pagination;
pub mod purchase;
pub mod update;
pub mod user;

pub use account::Account;
pub use cart::{Cart, CartItem};
pub use catalog::{format_money, Category, Page, Product};
pub use conversation::{ConversationContext, ConversationState, UserData};
pub use faq::Faq;
pub use pagination::Pagination;
pub use purchase::Purchase;
pub use update::Update;
pub use user::{ProfileField, Sender, User};
