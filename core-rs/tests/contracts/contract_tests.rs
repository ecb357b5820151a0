//! Contract Tests - Storage Invariant Protection
//!
//! This file aggregates all contract test modules. Contract tests
//! verify the invariants the storage engine guarantees to its callers:
//! path normalization, index self-agreement, reconcile idempotence and
//! the write pipeline's ordering rules.

// Contract test modules
mod contracts {
    // Path model contracts
    mod path {
        include!("path_contracts.rs");
    }

    // Index and reconcile contracts
    mod index {
        include!("index_contracts.rs");
    }

    // Write pipeline contracts
    mod pipeline {
        include!("pipeline_contracts.rs");
    }
}
