//! Message analysis used to steer the companion's replies: a keyword
//! classifier, a technique selector and the prompt composer.

pub mod classifier;
pub mod composer;
pub mod technique;

pub use classifier::{ classify, Classification };
pub use composer::compose;
pub use technique::{ select_technique, TechniqueChoice };
