//! Task executors for each of the reactor's four queues (design §4.6-4.9).
//! Every module here builds an [`crate::reactor::ExecuteFn`] closure for its
//! task type; `main` wires them into a [`crate::reactor::QueueControllerCollection`].

pub mod document;
pub mod download;
pub mod gitinfo;
pub mod validate;
