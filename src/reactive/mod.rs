//! Cold asynchronous values over blocking work
//!
//! [`AsyncResult`] and [`AsyncStream`] describe work without starting it; subscribing hands the
//! work to a [`BlockingScheduler`](crate::connection::pool::BlockingScheduler) and returns a
//! [`Subscription`] future or a [`StreamSubscription`] stream.

pub mod result;
pub mod stream;
pub mod subscription;
pub mod wrapper;

pub use result::AsyncResult;
pub use stream::AsyncStream;
pub use subscription::{Outcome, StreamSubscription, Subscription};
pub use wrapper::ReactiveWrapper;
