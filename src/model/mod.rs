pub mod api;
pub mod authority;
pub mod certifier;
pub mod notifier;
pub mod signature;
pub mod tally;
pub mod token;
