//! Data types shared by the storage layer and the HTTP handlers.

pub mod object;
