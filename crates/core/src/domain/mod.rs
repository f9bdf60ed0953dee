pub mod agent;
pub mod comparison;
pub mod feature;
pub mod key_feature;
