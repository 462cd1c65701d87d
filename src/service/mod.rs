pub mod accounts;
pub mod password;
pub mod token;
