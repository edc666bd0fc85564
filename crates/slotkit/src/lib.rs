#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(feature = "bitmap")]
mod bitmap;
mod error;
mod failure;
#[cfg(feature = "bitmap")]
mod lock;
#[cfg(feature = "pool")]
mod pool;

#[cfg_attr(docsrs, doc(cfg(feature = "bitmap")))]
#[cfg(feature = "bitmap")]
pub use crate::bitmap::*;
pub use crate::error::*;
pub use crate::failure::*;
#[cfg_attr(docsrs, doc(cfg(feature = "pool")))]
#[cfg(feature = "pool")]
pub use crate::pool::*;
