//! Filestore consumer errors (`spec.md` §4.G).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("filestore consumer queue is closed")]
    Closed,
}
