//! Quota keys and per-user quota resolution.
//!
//! Raw quota tables map resource strings to integers. Two resource kinds
//! drive scheduling:
//!
//! - `node-{group}-{TIER}`: ceiling on concurrently held nodes
//! - `node_limit-{group}-{TIER}`: administrative cap on that ceiling
//!
//! Keys are parsed once per tick into [`QuotaKey`]. Anything else in the
//! table is ignored, and malformed keys resolve to zero quota.

use std::collections::BTreeMap;

use fleet_id::{GroupName, UserName};
use fleet_model::{PriorityTier, User};
use tracing::debug;

/// Resource kind of a scheduling quota key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QuotaKind {
    Node,
    NodeLimit,
}

impl QuotaKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::NodeLimit => "node_limit",
        }
    }
}

/// Structured form of a scheduling quota key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QuotaKey {
    pub kind: QuotaKind,
    pub group: GroupName,
    pub tier: PriorityTier,
}

/// Outcome of parsing one raw resource string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedKey {
    /// A node or node_limit key. The tier may be `Unknown`.
    Scheduling(QuotaKey),

    /// Some other resource, not a scheduling input.
    Ignored,

    /// Looks like a scheduling key but has no group or tier.
    Malformed,
}

impl QuotaKey {
    pub fn new(kind: QuotaKind, group: GroupName, tier: PriorityTier) -> Self {
        Self { kind, group, tier }
    }

    /// Parse a raw resource string.
    ///
    /// The group is everything between the kind prefix and the last `-`, so
    /// group labels may themselves contain dashes.
    pub fn parse(raw: &str) -> ParsedKey {
        let Some((prefix, rest)) = raw.split_once('-') else {
            return ParsedKey::Ignored;
        };

        let kind = match prefix {
            "node" => QuotaKind::Node,
            "node_limit" => QuotaKind::NodeLimit,
            _ => return ParsedKey::Ignored,
        };

        match rest.rsplit_once('-') {
            Some((group, tier)) if !group.is_empty() && !tier.is_empty() => {
                ParsedKey::Scheduling(QuotaKey {
                    kind,
                    group: GroupName::new(group),
                    tier: PriorityTier::from_name(tier),
                })
            }
            _ => ParsedKey::Malformed,
        }
    }
}

impl std::fmt::Display for QuotaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.kind.prefix(), self.group, self.tier)
    }
}

/// Counters for quota entries that did not become usable quota.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaParseStats {
    pub parsed: usize,
    pub ignored: usize,
    pub malformed: usize,
    pub unknown_tier: usize,
    pub negative: usize,
}

impl QuotaParseStats {
    pub fn merge(&mut self, other: &QuotaParseStats) {
        self.parsed += other.parsed;
        self.ignored += other.ignored;
        self.malformed += other.malformed;
        self.unknown_tier += other.unknown_tier;
        self.negative += other.negative;
    }

    /// Entries that looked like scheduling keys but contribute nothing.
    pub fn rejected(&self) -> usize {
        self.malformed + self.unknown_tier
    }
}

/// Parse one owner's raw table, keeping the max per key.
fn parse_table(
    owner: &UserName,
    raw: &BTreeMap<String, i64>,
    stats: &mut QuotaParseStats,
) -> BTreeMap<QuotaKey, u32> {
    let mut table = BTreeMap::new();

    for (resource, value) in raw {
        let key = match QuotaKey::parse(resource) {
            ParsedKey::Scheduling(key) => key,
            ParsedKey::Ignored => {
                stats.ignored += 1;
                continue;
            }
            ParsedKey::Malformed => {
                stats.malformed += 1;
                debug!(owner = %owner, resource = %resource, "Ignoring malformed quota key");
                continue;
            }
        };

        if key.tier == PriorityTier::Unknown {
            stats.unknown_tier += 1;
            debug!(owner = %owner, resource = %resource, "Ignoring quota key with unknown tier");
            continue;
        }

        if *value < 0 {
            stats.negative += 1;
        }
        let value = u32::try_from((*value).max(0)).unwrap_or(u32::MAX);

        stats.parsed += 1;
        table
            .entry(key)
            .and_modify(|v: &mut u32| *v = (*v).max(value))
            .or_insert(value);
    }

    table
}

/// A user's effective node ceilings, keyed by (group, tier).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaTable {
    ceilings: BTreeMap<(GroupName, PriorityTier), u32>,
}

impl QuotaTable {
    /// Resolve `user`'s quota against the other owner rows.
    ///
    /// For each key the user's own entry wins. Without one, the max over
    /// the user's groups and the row named after its role applies. The
    /// ceiling for (group, tier) is the `node` value, capped by
    /// `node_limit` when that is present; a `node_limit` alone grants
    /// nothing.
    pub fn resolve(
        user: &User,
        owners: &BTreeMap<UserName, User>,
        stats: &mut QuotaParseStats,
    ) -> Self {
        let own = parse_table(&user.user_name, &user.quota, stats);

        let role = UserName::new(user.role.as_str());
        let mut inherited: BTreeMap<QuotaKey, u32> = BTreeMap::new();
        for owner_name in user.groups.iter().chain(std::iter::once(&role)) {
            if owner_name == &user.user_name {
                continue;
            }
            let Some(owner) = owners.get(owner_name) else {
                continue;
            };
            let mut owner_stats = QuotaParseStats::default();
            for (key, value) in parse_table(&owner.user_name, &owner.quota, &mut owner_stats) {
                inherited
                    .entry(key)
                    .and_modify(|v| *v = (*v).max(value))
                    .or_insert(value);
            }
        }

        let mut effective = inherited;
        effective.extend(own);

        let mut ceilings = BTreeMap::new();
        for (key, value) in &effective {
            if key.kind != QuotaKind::Node {
                continue;
            }
            let limit_key = QuotaKey::new(QuotaKind::NodeLimit, key.group.clone(), key.tier);
            let ceiling = match effective.get(&limit_key) {
                Some(limit) => (*value).min(*limit),
                None => *value,
            };
            ceilings.insert((key.group.clone(), key.tier), ceiling);
        }

        Self { ceilings }
    }

    /// Ceiling for (group, tier); zero when no quota is held.
    pub fn ceiling(&self, group: &GroupName, tier: PriorityTier) -> u32 {
        self.ceilings
            .get(&(group.clone(), tier))
            .copied()
            .unwrap_or(0)
    }

    /// Returns true if any tier grants quota in `group`.
    pub fn holds_quota_in(&self, group: &GroupName) -> bool {
        self.ceilings
            .iter()
            .any(|((g, _), ceiling)| g == group && *ceiling > 0)
    }

    /// Groups with a positive ceiling at some tier.
    pub fn groups(&self) -> impl Iterator<Item = &GroupName> {
        let mut last: Option<&GroupName> = None;
        self.ceilings.iter().filter_map(move |((group, _), ceiling)| {
            if *ceiling == 0 || last == Some(group) {
                return None;
            }
            last = Some(group);
            Some(group)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.ceilings.is_empty()
    }
}
