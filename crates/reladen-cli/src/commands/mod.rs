pub mod common;
pub mod outbox;
pub mod run;
pub mod sync;
pub mod tick;
