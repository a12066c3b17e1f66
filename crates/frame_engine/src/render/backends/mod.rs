//! Graphics backends

pub mod vulkan;

#[cfg(test)]
pub(crate) mod mock;
