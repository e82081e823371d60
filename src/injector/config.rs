//! Injector configuration.

use crate::classfile::attributes::DecodeOptions;

/// Switches controlling how an [`crate::Injector`] decodes, composes and emits classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct InjectorConfig {
    /// Do not offer synthetic and bridge members to visitors
    pub skip_synthetic_members: bool,

    /// Add `NestHost`/`NestMembers` so helper classes can reach private members.
    /// Without it, accessors to private members are rejected at plan time.
    pub emit_nest_attributes: bool,

    /// Mark rewritten classes with the injector's name; stamped classes are not woven twice
    pub stamp_output: bool,

    /// Decode every emitted image again before returning it
    pub verify_output: bool,

    /// Nesting limit for annotation element values (default: 32)
    pub max_annotation_depth: usize,

    /// Transform batches on the rayon thread pool
    pub parallel_batch: bool,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            skip_synthetic_members: true,
            emit_nest_attributes: true,
            stamp_output: true,
            verify_output: false,
            max_annotation_depth: 32,
            parallel_batch: true,
        }
    }
}

impl InjectorConfig {
    /// Creates a configuration that only rewrites, for offline tools that post-process images
    ///
    /// No stamps, no nest attributes, no verification and no thread pool.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            skip_synthetic_members: true,
            emit_nest_attributes: false,
            stamp_output: false,
            verify_output: false,
            max_annotation_depth: 32,
            parallel_batch: false,
        }
    }

    /// Creates the configuration used when weaving classes at load time
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }

    /// Creates a configuration that re-decodes everything it emits
    ///
    /// Synthetic members are shown to visitors as well, so a visitor that cannot handle them
    /// fails loudly instead of being bypassed.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            skip_synthetic_members: false,
            emit_nest_attributes: true,
            stamp_output: true,
            verify_output: true,
            max_annotation_depth: 32,
            parallel_batch: true,
        }
    }

    /// Decoding limits derived from this configuration.
    #[must_use]
    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            max_annotation_depth: self.max_annotation_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        let minimal = InjectorConfig::minimal();
        assert!(!minimal.stamp_output);
        assert!(!minimal.emit_nest_attributes);
        assert!(!minimal.parallel_batch);

        assert_eq!(InjectorConfig::production(), InjectorConfig::default());

        let strict = InjectorConfig::strict();
        assert!(strict.verify_output);
        assert!(!strict.skip_synthetic_members);
        assert_eq!(strict.decode_options().max_annotation_depth, 32);
    }
}
