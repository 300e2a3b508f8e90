// Secured search query assembly.

pub mod assembler;
pub mod criterion;
pub mod factory;

pub use assembler::{
    AssemblerConfig, CallerScope, QueryAssembler, QueryMode, SearchStatements, SecuredStatement,
    SecurityScope, StateRestriction, StateRestrictionPolicy,
};
pub use criterion::{Criterion, CriterionColumn, FieldPath, MetadataColumn, Operator, PlaceholderStyle};
pub use factory::{CriterionFactory, DefinitionCriterionFactory};
