//! Mapping engine for CBlocks.
//!
//! Transforms raw resource values into derived values and keeps their
//! history:
//! - `range`: linear normalization to `[0, 100]`
//! - `category`: discrete value labelling
//! - `use_case`: mapping CRUD and apply, generic over the strategy
//! - `action`: automation trigger bridge

pub mod action;
pub mod category;
pub mod range;
pub mod use_case;

pub use action::{ActionBridge, ActionFields, ActionInstance, ActionRequest, ActionResponse};
pub use category::{CategoryLabel, CategoryMapping};
pub use range::RangeMapping;
pub use use_case::MappingsUseCase;

/// Use case over category mappings.
pub type CategoryMappingsUseCase = MappingsUseCase<CategoryMapping>;

/// Use case over range mappings.
pub type RangeMappingsUseCase = MappingsUseCase<RangeMapping>;
