//! Per-call parse options and processing hooks.

use std::collections::BTreeMap;
use std::fmt;

use stevedore_common::error::Result;

use crate::config::ServiceConfig;
use crate::interpolation::UndefinedVariablePolicy;
use crate::value::RawServiceMap;

/// Hook run on the raw service map before validation and merge.
pub type PreprocessFn = Box<dyn Fn(RawServiceMap) -> Result<RawServiceMap> + Send + Sync>;

/// Hook run on the typed services after conversion.
pub type PostprocessFn = Box<
    dyn Fn(BTreeMap<String, ServiceConfig>) -> Result<BTreeMap<String, ServiceConfig>>
        + Send
        + Sync,
>;

/// Controls which optional stages of a merge run.
pub struct ParseOptions {
    /// Substitute variable references.
    pub interpolate: bool,
    /// Run structural validation on the raw services.
    pub validate: bool,
    /// What to do with references to undefined variables.
    pub undefined: UndefinedVariablePolicy,
    /// Optional hook on the raw service map.
    pub preprocess: Option<PreprocessFn>,
    /// Optional hook on the converted services.
    pub postprocess: Option<PostprocessFn>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            interpolate: true,
            validate: true,
            undefined: UndefinedVariablePolicy::default(),
            preprocess: None,
            postprocess: None,
        }
    }
}

impl fmt::Debug for ParseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseOptions")
            .field("interpolate", &self.interpolate)
            .field("validate", &self.validate)
            .field("undefined", &self.undefined)
            .field("preprocess", &self.preprocess.is_some())
            .field("postprocess", &self.postprocess.is_some())
            .finish()
    }
}

impl ParseOptions {
    /// Enables or disables interpolation.
    #[must_use]
    pub const fn interpolate(mut self, enabled: bool) -> Self {
        self.interpolate = enabled;
        self
    }

    /// Enables or disables validation.
    #[must_use]
    pub const fn validate(mut self, enabled: bool) -> Self {
        self.validate = enabled;
        self
    }

    /// Sets the undefined-variable policy.
    #[must_use]
    pub const fn undefined(mut self, policy: UndefinedVariablePolicy) -> Self {
        self.undefined = policy;
        self
    }

    /// Installs a preprocess hook.
    #[must_use]
    pub fn preprocess<F>(mut self, hook: F) -> Self
    where
        F: Fn(RawServiceMap) -> Result<RawServiceMap> + Send + Sync + 'static,
    {
        self.preprocess = Some(Box::new(hook));
        self
    }

    /// Installs a postprocess hook.
    #[must_use]
    pub fn postprocess<F>(mut self, hook: F) -> Self
    where
        F: Fn(BTreeMap<String, ServiceConfig>) -> Result<BTreeMap<String, ServiceConfig>>
            + Send
            + Sync
            + 'static,
    {
        self.postprocess = Some(Box::new(hook));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_interpolate_and_validate() {
        let options = ParseOptions::default();
        assert!(options.interpolate);
        assert!(options.validate);
        assert_eq!(options.undefined, UndefinedVariablePolicy::Empty);
        assert!(options.preprocess.is_none());
    }

    #[test]
    fn builder_sets_fields() {
        let options = ParseOptions::default()
            .interpolate(false)
            .validate(false)
            .undefined(UndefinedVariablePolicy::Error)
            .preprocess(|services: RawServiceMap| Ok(services));
        assert!(!options.interpolate);
        assert!(!options.validate);
        assert_eq!(options.undefined, UndefinedVariablePolicy::Error);
        assert!(options.preprocess.is_some());
        let debug = format!("{options:?}");
        assert!(debug.contains("preprocess: true"), "got: {debug}");
    }
}
