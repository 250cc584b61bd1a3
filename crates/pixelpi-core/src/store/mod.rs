// ── Shared state containers ──

mod atomic;
mod collection;

#[cfg(test)]
pub(crate) use atomic::write_atomic;
pub(crate) use atomic::{read_optional, write_atomic_async};
pub(crate) use collection::EntityCollection;
