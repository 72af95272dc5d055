//! The three calls a host needs: classify, resolve, redact

use std::sync::Arc;

use avrofilter_config::FilterConfig;
use avrofilter_core::{
    ContentTypeClassifier, Datatype, ForbiddenSet, MissingFieldPolicy, PolicyModel, resolve,
};
use avrofilter_redact::{ByteStream, redact_stream};
use bytes::Bytes;
use futures_util::Stream;

/// Why a response was left untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
    NotObjectRead,
    NoStripRole,
    UnrecognizedContentType,
    UnprotectedDatatype,
    NothingForbidden,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    PassThrough(PassReason),
    Redact(ForbiddenSet),
}

/// Recorded in response extensions so hosts can see what happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    Applied { datatype: Datatype, removed: usize },
    PassedThrough(PassReason),
}

#[derive(Debug, Clone)]
pub struct AvroFilter {
    policy: Arc<PolicyModel>,
    classifier: ContentTypeClassifier,
    missing: MissingFieldPolicy,
}

impl AvroFilter {
    pub fn new(
        policy: PolicyModel,
        classifier: ContentTypeClassifier,
        missing: MissingFieldPolicy,
    ) -> Self {
        Self {
            policy: Arc::new(policy),
            classifier,
            missing,
        }
    }

    /// Fails on a malformed retain key, so a bad config never half-loads
    pub fn from_config(config: &FilterConfig) -> avrofilter_core::Result<Self> {
        Ok(Self::new(
            config.policy()?,
            config.classifier(),
            config.missing_field_policy(),
        ))
    }

    pub fn policy(&self) -> &PolicyModel {
        &self.policy
    }

    pub fn classify(&self, content_type: &str) -> Option<Datatype> {
        self.classifier.classify(content_type)
    }

    pub fn resolve<'a, I>(&self, roles: I, datatype: &Datatype) -> ForbiddenSet
    where
        I: IntoIterator<Item = &'a str>,
    {
        resolve(&self.policy, roles, datatype)
    }

    pub fn redact<S, E>(&self, body: S, forbidden: &ForbiddenSet) -> ByteStream
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        redact_stream(body, forbidden, self.missing)
    }

    /// Whether any of `roles` bypasses redaction entirely
    pub fn has_no_strip_role<'a, I>(&self, roles: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        roles.into_iter().any(|role| self.policy.is_no_strip(role))
    }

    /// Full decision for one response
    pub fn decide<'a, I>(&self, roles: I, content_type: Option<&str>) -> Decision
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        if self.has_no_strip_role(roles.clone()) {
            return Decision::PassThrough(PassReason::NoStripRole);
        }

        let Some(datatype) = content_type.and_then(|ct| self.classify(ct)) else {
            return Decision::PassThrough(PassReason::UnrecognizedContentType);
        };

        if !self.policy.has_datatype(datatype.as_str()) {
            return Decision::PassThrough(PassReason::UnprotectedDatatype);
        }

        let forbidden = self.resolve(roles, &datatype);
        if forbidden.is_empty() {
            return Decision::PassThrough(PassReason::NothingForbidden);
        }

        Decision::Redact(forbidden)
    }
}
