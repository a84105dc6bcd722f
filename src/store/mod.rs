//! Typed CRUD over items, units and snapshots, composed into atomic
//! transactions where the spec requires it (§4.1).

mod repository;

pub use repository::{ItemFilters, ItemPage, Repository, UnitFilters, UnitPage};
