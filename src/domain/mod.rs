pub mod api_key;
pub mod engagement;
pub mod pagination;
pub mod post;
pub mod social_account;
pub mod stats;
pub mod user;
