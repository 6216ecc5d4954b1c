pub mod bundle_composer;

pub use bundle_composer::{BundleComposer, ComposerSettings, TRANSFER_GAS};
