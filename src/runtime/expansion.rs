//! Expansion of one executable template into concrete, independently
//! runnable variants.

use serde::{Deserialize, Serialize};

use std::sync::Arc;

use crate::{
    CipherSuite, DerivationScope, KeyExchangeAlgorithm, MatrixResult, ParameterCombination, Peer,
    TestEndpoint, TlsConfig, WorkflowTrace,
};

/// How each eligible capability value is written into a variant's config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionStrategy {
    /// One variant, the template as built.
    #[default]
    None,
    /// The tester advertises only the value.
    ReplaceSupported,
    /// The value is appended to what the tester already advertises.
    AppendEachSupported,
    /// Only the negotiated selection changes.
    ReplaceSelected,
}

impl ExpansionStrategy {
    pub fn touches_advertised_set(self) -> bool {
        matches!(self, Self::ReplaceSupported | Self::AppendEachSupported)
    }
}

/// Base configuration and abstract trace produced by a test for one
/// combination. Read-only input to expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableTemplate {
    pub config: TlsConfig,
    pub trace: WorkflowTrace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ConfigMutation {
    ReplaceSupported { peer: Peer, suite: CipherSuite },
    AppendSupported { peer: Peer, suite: CipherSuite },
    ReplaceSelected { suite: CipherSuite },
    RegenerateKeyExchange { kx: KeyExchangeAlgorithm, messages: usize },
}

/// Private copy of the template config and trace plus what was changed.
#[derive(Debug, Clone)]
pub struct ConcreteVariant {
    pub index: usize,
    pub test_id: String,
    pub combination: Arc<ParameterCombination>,
    /// Capability value this variant was expanded for.
    pub capability: Option<CipherSuite>,
    pub config: TlsConfig,
    pub trace: WorkflowTrace,
    pub mutations: Vec<ConfigMutation>,
}

impl ConcreteVariant {
    pub fn label(&self) -> String {
        match self.capability {
            Some(suite) => format!(
                "{}#{} [{}] via {suite}",
                self.test_id, self.index, self.combination
            ),
            None => format!("{}#{} [{}]", self.test_id, self.index, self.combination),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expansion {
    Variants(Vec<ConcreteVariant>),
    /// No capability value qualified; the test is disabled, not failed.
    NotApplicable { reason: String },
}

/// Expands `template` for one combination. Variant indices start at
/// `first_index`. The template is only read.
pub fn expand(
    template: &ExecutableTemplate,
    combination: Arc<ParameterCombination>,
    scope: &DerivationScope,
    first_index: usize,
) -> MatrixResult<Expansion> {
    let strategy = scope.expansion();
    if strategy == ExpansionStrategy::None {
        return Ok(Expansion::Variants(vec![ConcreteVariant {
            index: first_index,
            test_id: scope.test_id().to_string(),
            combination,
            capability: None,
            config: template.config.clone(),
            trace: template.trace.clone(),
            mutations: Vec::new(),
        }]));
    }

    let eligible = crate::compatible_cipher_suites(scope);
    if eligible.is_empty() {
        return Ok(Expansion::NotApplicable {
            reason: format!(
                "target supports no cipher suite compatible with the key exchange of {}",
                scope.test_id()
            ),
        });
    }

    let endpoint = scope.endpoint();
    let tester = endpoint.tester();
    let mut variants = Vec::with_capacity(eligible.len());
    for (offset, suite) in eligible.into_iter().enumerate() {
        let mut config = template.config.clone();
        let mut trace = template.trace.clone();
        let mut mutations = Vec::with_capacity(2);

        match strategy {
            ExpansionStrategy::ReplaceSupported => {
                config.offer_mut(tester).cipher_suites = vec![suite];
                mutations.push(ConfigMutation::ReplaceSupported { peer: tester, suite });
            }
            ExpansionStrategy::AppendEachSupported => {
                let suites = &mut config.offer_mut(tester).cipher_suites;
                if !suites.contains(&suite) {
                    suites.push(suite);
                }
                mutations.push(ConfigMutation::AppendSupported { peer: tester, suite });
            }
            ExpansionStrategy::ReplaceSelected => {
                config.selected_cipher_suite = Some(suite);
                mutations.push(ConfigMutation::ReplaceSelected { suite });
            }
            ExpansionStrategy::None => {}
        }

        // The responder's key-exchange messages are built for the suite the
        // template was written for; rebuild them for the new one.
        if endpoint == TestEndpoint::Server && strategy.touches_advertised_set() {
            let kx = suite.key_exchange()?;
            let messages = trace.regenerate_key_exchange(kx);
            mutations.push(ConfigMutation::RegenerateKeyExchange { kx, messages });
        }

        variants.push(ConcreteVariant {
            index: first_index + offset,
            test_id: scope.test_id().to_string(),
            combination: Arc::clone(&combination),
            capability: Some(suite),
            config,
            trace,
            mutations,
        });
    }
    Ok(Expansion::Variants(variants))
}
