//! Utilities that don't belong to any particular module

mod unwrap_or;

pub(crate) use unwrap_or::unwrap_or;
