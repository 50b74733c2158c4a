use std::future::Future;

use crate::backend::{Backend, Error};
use crate::reply::Reply;

/// A command that translates itself into backend operations.
pub trait Executable {
    fn exec<B: Backend>(self, backend: &mut B) -> impl Future<Output = Result<Reply, Error>> + Send;
}
