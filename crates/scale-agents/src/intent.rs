use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::config::AgentKind;

/// Weight of a single matched keyword. Scores saturate at 1.0.
const KEYWORD_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Health,
    Storage,
    Quota,
    Performance,
    Admin,
    Help,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Health => "health",
            Intent::Storage => "storage",
            Intent::Quota => "quota",
            Intent::Performance => "performance",
            Intent::Admin => "admin",
            Intent::Help => "help",
            Intent::Unknown => "unknown",
        }
    }

    pub fn target_agent(&self) -> Option<AgentKind> {
        match self {
            Intent::Health => Some(AgentKind::Health),
            Intent::Storage => Some(AgentKind::Storage),
            Intent::Quota => Some(AgentKind::Quota),
            Intent::Performance => Some(AgentKind::Performance),
            Intent::Admin => Some(AgentKind::Admin),
            Intent::Help | Intent::Unknown => None,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntentClassification {
    pub intent: Intent,
    pub confidence: f64,
    pub keywords_matched: Vec<String>,
    pub target_agent: Option<AgentKind>,
    pub extracted_params: HashMap<String, String>,
}

impl IntentClassification {
    pub fn new(intent: Intent, confidence: f64) -> Self {
        Self {
            intent,
            confidence,
            keywords_matched: Vec::new(),
            target_agent: intent.target_agent(),
            extracted_params: HashMap::new(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(Intent::Unknown, 0.0)
    }
}

/// Turns user text into an intent. Implementations must be pure.
pub trait IntentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> IntentClassification;
}

const INTENT_PATTERNS: &[(Intent, &[&str])] = &[
    (
        Intent::Health,
        &[
            r"(?i)\b(health|healthy|unhealthy|status|state|alert|event|events)\b",
            r"(?i)\b(monitor|monitoring|diagnostic|diagnostics)\b",
            r"(?i)\b(node.*(status|health|state)|cluster.*health)\b",
            r"(?i)\b(what.*(wrong|issue|problem)|any.*issue|any.*problem)\b",
        ],
    ),
    (
        Intent::Storage,
        &[
            r"(?i)\b(filesystem|fileset|filesets|mount|unmount)\b",
            r"(?i)\b(create|delete|link|unlink).*(fileset|filesystem)\b",
            r"(?i)\b(storage.pool|pool)\b",
            r"(?i)\b(list|show).*(filesystem|fileset)\b",
        ],
    ),
    (
        Intent::Quota,
        &[
            r"(?i)\b(quota|quotas)\b",
            r"(?i)\b(usage|capacity|space|limit)\b",
            r"(?i)\b(set|delete|remove).*(quota|limit)\b",
            r"(?i)\b(how.much.*(used|space|available))\b",
        ],
    ),
    (
        Intent::Performance,
        &[
            r"(?i)\b(performance|bottleneck|slow|latency|throughput)\b",
            r"(?i)\b(iops|bandwidth|io)\b",
            r"(?i)\b(analyze|analysis|investigate).*(performance|slow)\b",
            r"(?i)\b(why.*(slow|taking|long))\b",
        ],
    ),
    (
        Intent::Admin,
        &[
            r"(?i)\b(snapshot|snapshots)\b",
            r"(?i)\b(cluster|remote.cluster|nsd)\b",
            r"(?i)\b(start|stop|restart).*(node|nodes|cluster)\b",
            r"(?i)\b(add|remove).*(node|cluster)\b",
            r"(?i)\b(config|configuration|setting)\b",
            r"(?i)\b(authorize|unauthorize|trust)\b",
        ],
    ),
    (
        Intent::Help,
        &[
            r"(?i)\b(help|assist|how.do.i|what.can)\b",
            r"(?i)\b(capabilities|features|commands)\b",
        ],
    ),
];

/// Words that follow "node", "fileset" and friends without being a name.
const NOT_A_NAME: &[&str] = &[
    "a", "all", "an", "analysis", "and", "are", "at", "config", "configuration", "detail",
    "details", "event", "events", "for", "from", "health", "in", "info", "information", "is",
    "list", "metrics", "nodes", "of", "on", "performance", "pool", "pools", "quota", "quotas",
    "state", "states", "status", "the", "to", "usage", "version", "versions", "with",
];

const SEP: &str = r"(?:\s*[:=]\s*|\s+)(?:named\s+|called\s+)?";
const NAME: &str = r"([A-Za-z0-9][\w.\-]*)";

/// Pulls node, filesystem, fileset, snapshot, user, group and remote cluster
/// names out of free text, plus paths and size limits such as `10TB`.
pub struct ParameterExtractor {
    rules: Vec<(&'static str, Vec<Regex>)>,
}

impl ParameterExtractor {
    pub fn try_new() -> Result<Self, regex::Error> {
        let keyed = |prefix: &str| Regex::new(&format!(r"(?i)\b{prefix}{SEP}{NAME}"));

        Ok(Self {
            rules: vec![
                (
                    "node",
                    vec![
                        keyed("(?:node|host)")?,
                        Regex::new(r"(?i)\b(node\d[\w.\-]*)")?,
                    ],
                ),
                (
                    "filesystem",
                    vec![
                        keyed(r"(?:filesystem|file\s+system|fs)")?,
                        Regex::new(r"(?i)\b(gpfs[\w\-]*)")?,
                    ],
                ),
                ("fileset", vec![keyed("fileset")?]),
                ("snapshot", vec![keyed("snapshot")?]),
                ("user", vec![keyed("user")?]),
                ("group", vec![keyed("group")?]),
                ("cluster", vec![keyed(r"(?:remote\s+)?cluster")?]),
                ("path", vec![Regex::new(r"(?:^|\s)(/[\w./\-]*)")?]),
                (
                    "limit",
                    vec![Regex::new(r"(?i)\b(\d+(?:\.\d+)?\s?[kmgtp]i?b?)\b")?],
                ),
            ],
        })
    }

    pub fn extract(&self, text: &str) -> HashMap<String, String> {
        let mut params = HashMap::new();
        for (key, patterns) in &self.rules {
            let found = patterns.iter().find_map(|re| {
                re.captures_iter(text)
                    .filter_map(|caps| caps.get(1))
                    .map(|m| m.as_str().trim_end_matches(['.', '-']))
                    .find(|name| !name.is_empty() && !NOT_A_NAME.contains(&name.to_lowercase().as_str()))
            });
            if let Some(name) = found {
                params.insert(key.to_string(), name.to_string());
            }
        }
        params
    }
}

/// Keyword scoring over a fixed regex table.
///
/// Every non-empty capture of every match counts as one keyword. The intent
/// with the most keywords wins and ties go to the intent listed first.
pub struct PatternClassifier {
    patterns: Vec<(Intent, Vec<Regex>)>,
    extractor: ParameterExtractor,
}

impl PatternClassifier {
    pub fn try_new() -> Result<Self, regex::Error> {
        let patterns = INTENT_PATTERNS
            .iter()
            .map(|(intent, sources)| {
                let compiled = sources
                    .iter()
                    .map(|source| Regex::new(source))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((*intent, compiled))
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self {
            patterns,
            extractor: ParameterExtractor::try_new()?,
        })
    }

    fn keywords(patterns: &[Regex], text: &str) -> Vec<String> {
        let mut matched = Vec::new();
        for re in patterns {
            for caps in re.captures_iter(text) {
                if caps.len() == 1 {
                    matched.push(caps[0].to_string());
                    continue;
                }
                matched.extend(
                    caps.iter()
                        .skip(1)
                        .flatten()
                        .map(|m| m.as_str())
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                );
            }
        }
        matched
    }
}

impl IntentClassifier for PatternClassifier {
    fn classify(&self, text: &str) -> IntentClassification {
        let mut best: Option<(Intent, f64, Vec<String>)> = None;

        for (intent, patterns) in &self.patterns {
            let matched = Self::keywords(patterns, text);
            if matched.is_empty() {
                continue;
            }
            let score = (matched.len() as f64 * KEYWORD_WEIGHT).min(1.0);
            if best.as_ref().map_or(true, |(_, top, _)| score > *top) {
                best = Some((*intent, score, matched));
            }
        }

        let mut classification = match best {
            Some((intent, confidence, keywords_matched)) => IntentClassification {
                keywords_matched,
                ..IntentClassification::new(intent, confidence)
            },
            None => IntentClassification::unknown(),
        };
        classification.extracted_params = self.extractor.extract(text);
        classification
    }
}
