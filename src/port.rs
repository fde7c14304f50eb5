use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Standard container categories tracked per agent.
///
/// The declaration order is the column order of the import sheet: the label
/// cell sits at index 0 and each container type follows at `index() + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerType {
    Gp20,
    Hc40,
    Rf20,
    Rf40,
    Ot20,
    Ot40,
    Fr20,
    Fr40,
    Tk20,
    Hc45,
}

impl ContainerType {
    /// All container types in sheet column order
    pub const ALL: [ContainerType; 10] = [
        ContainerType::Gp20,
        ContainerType::Hc40,
        ContainerType::Rf20,
        ContainerType::Rf40,
        ContainerType::Ot20,
        ContainerType::Ot40,
        ContainerType::Fr20,
        ContainerType::Fr40,
        ContainerType::Tk20,
        ContainerType::Hc45,
    ];

    /// Short code used in JSON payloads (`20GP`, `40HC`, ...)
    pub fn code(self) -> &'static str {
        match self {
            ContainerType::Gp20 => "20GP",
            ContainerType::Hc40 => "40HC",
            ContainerType::Rf20 => "20RF",
            ContainerType::Rf40 => "40RF",
            ContainerType::Ot20 => "20OT",
            ContainerType::Ot40 => "40OT",
            ContainerType::Fr20 => "20FR",
            ContainerType::Fr40 => "40FR",
            ContainerType::Tk20 => "20TK",
            ContainerType::Hc45 => "45HC",
        }
    }

    /// Column heading as it appears on the import sheet (`20'GP`, `45 HC`, ...)
    pub fn sheet_heading(self) -> &'static str {
        match self {
            ContainerType::Gp20 => "20'GP",
            ContainerType::Hc40 => "40'HC",
            ContainerType::Rf20 => "20'RF",
            ContainerType::Rf40 => "40'RF",
            ContainerType::Ot20 => "20'OT",
            ContainerType::Ot40 => "40'OT",
            ContainerType::Fr20 => "20'FR",
            ContainerType::Fr40 => "40'FR",
            ContainerType::Tk20 => "20'TK",
            ContainerType::Hc45 => "45 HC",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code().eq_ignore_ascii_case(code))
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Container counts for one agent, one field per container type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerCounts {
    pub gp20: u32,
    pub hc40: u32,
    pub rf20: u32,
    pub rf40: u32,
    pub ot20: u32,
    pub ot40: u32,
    pub fr20: u32,
    pub fr40: u32,
    pub tk20: u32,
    pub hc45: u32,
}

impl ContainerCounts {
    pub fn get(&self, kind: ContainerType) -> u32 {
        match kind {
            ContainerType::Gp20 => self.gp20,
            ContainerType::Hc40 => self.hc40,
            ContainerType::Rf20 => self.rf20,
            ContainerType::Rf40 => self.rf40,
            ContainerType::Ot20 => self.ot20,
            ContainerType::Ot40 => self.ot40,
            ContainerType::Fr20 => self.fr20,
            ContainerType::Fr40 => self.fr40,
            ContainerType::Tk20 => self.tk20,
            ContainerType::Hc45 => self.hc45,
        }
    }

    pub fn set(&mut self, kind: ContainerType, value: u32) {
        let slot = match kind {
            ContainerType::Gp20 => &mut self.gp20,
            ContainerType::Hc40 => &mut self.hc40,
            ContainerType::Rf20 => &mut self.rf20,
            ContainerType::Rf40 => &mut self.rf40,
            ContainerType::Ot20 => &mut self.ot20,
            ContainerType::Ot40 => &mut self.ot40,
            ContainerType::Fr20 => &mut self.fr20,
            ContainerType::Fr40 => &mut self.fr40,
            ContainerType::Tk20 => &mut self.tk20,
            ContainerType::Hc45 => &mut self.hc45,
        };
        *slot = value;
    }

    /// Sum of all ten counts; ten `u32` values always fit in a `u64`.
    pub fn sum(&self) -> u64 {
        ContainerType::ALL
            .iter()
            .map(|t| u64::from(self.get(*t)))
            .sum()
    }
}

/// One shipping agent's container inventory at a port.
///
/// `total` always equals `counts.sum()`; every constructor, mutator and
/// deserialization path recomputes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "AgentWire", into = "AgentWire")]
pub struct AgentRecord {
    pub name: String,
    pub counts: ContainerCounts,
    pub total: u64,
}

impl AgentRecord {
    pub fn new(name: impl Into<String>, counts: ContainerCounts) -> Self {
        AgentRecord {
            name: name.into(),
            total: counts.sum(),
            counts,
        }
    }

    /// Recompute `total` after the counts were edited in place
    pub fn refresh_total(&mut self) {
        self.total = self.counts.sum();
    }
}

// Flat on-the-wire shape: {"agent": .., "20GP": .., ..., "total": ..}
#[derive(Serialize, Deserialize)]
struct AgentWire {
    agent: String,
    #[serde(rename = "20GP", default)]
    gp20: u32,
    #[serde(rename = "40HC", default)]
    hc40: u32,
    #[serde(rename = "20RF", default)]
    rf20: u32,
    #[serde(rename = "40RF", default)]
    rf40: u32,
    #[serde(rename = "20OT", default)]
    ot20: u32,
    #[serde(rename = "40OT", default)]
    ot40: u32,
    #[serde(rename = "20FR", default)]
    fr20: u32,
    #[serde(rename = "40FR", default)]
    fr40: u32,
    #[serde(rename = "20TK", default)]
    tk20: u32,
    #[serde(rename = "45HC", default)]
    hc45: u32,
    #[serde(default)]
    total: u64,
}

impl From<AgentWire> for AgentRecord {
    fn from(wire: AgentWire) -> Self {
        let counts = ContainerCounts {
            gp20: wire.gp20,
            hc40: wire.hc40,
            rf20: wire.rf20,
            rf40: wire.rf40,
            ot20: wire.ot20,
            ot40: wire.ot40,
            fr20: wire.fr20,
            fr40: wire.fr40,
            tk20: wire.tk20,
            hc45: wire.hc45,
        };
        AgentRecord::new(wire.agent, counts)
    }
}

impl From<AgentRecord> for AgentWire {
    fn from(record: AgentRecord) -> Self {
        let c = record.counts;
        AgentWire {
            agent: record.name,
            gp20: c.gp20,
            hc40: c.hc40,
            rf20: c.rf20,
            rf40: c.rf40,
            ot20: c.ot20,
            ot40: c.ot40,
            fr20: c.fr20,
            fr40: c.fr40,
            tk20: c.tk20,
            hc45: c.hc45,
            total: record.total,
        }
    }
}

/// A port city and the agents holding containers there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortRecord {
    pub city: String,
    pub agents: Vec<AgentRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PortRecord {
    pub fn new(city: &str) -> Self {
        let now = Utc::now();
        PortRecord {
            city: normalize_city(city),
            agents: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn agent(&self, name: &str) -> Option<&AgentRecord> {
        self.agents.iter().find(|a| a.name == name)
    }

    /// Replace any agent with the same name, then append `agent` at the end.
    ///
    /// Returns whether an existing entry was replaced.
    pub fn replace_agent(&mut self, agent: AgentRecord) -> bool {
        let removed = self.remove_agent(&agent.name);
        self.agents.push(agent);
        self.touch();
        removed
    }

    pub fn remove_agent(&mut self, name: &str) -> bool {
        let before = self.agents.len();
        self.agents.retain(|a| a.name != name);
        let removed = self.agents.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Replace the whole agent list, collapsing duplicate names by replace-by-name.
    pub fn set_agents(&mut self, agents: Vec<AgentRecord>) {
        self.agents = merge_agents(agents);
        self.touch();
    }

    pub fn total_containers(&self) -> u64 {
        self.agents
            .iter()
            .fold(0u64, |acc, a| acc.saturating_add(a.total))
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Canonical form of a city key: trimmed and uppercased.
pub fn normalize_city(city: &str) -> String {
    city.trim().to_uppercase()
}

/// Fold a list of agents so each name appears once.
///
/// A later entry with a repeated name replaces the earlier one and moves to
/// the end, matching the import ordering.
pub fn merge_agents(agents: impl IntoIterator<Item = AgentRecord>) -> Vec<AgentRecord> {
    let mut merged: Vec<AgentRecord> = Vec::new();
    for mut agent in agents {
        agent.refresh_total();
        merged.retain(|a| a.name != agent.name);
        merged.push(agent);
    }
    merged
}

/// Partial update of one agent. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentPatch {
    #[serde(default, rename = "agent")]
    pub name: Option<String>,
    #[serde(default, rename = "20GP")]
    pub gp20: Option<u32>,
    #[serde(default, rename = "40HC")]
    pub hc40: Option<u32>,
    #[serde(default, rename = "20RF")]
    pub rf20: Option<u32>,
    #[serde(default, rename = "40RF")]
    pub rf40: Option<u32>,
    #[serde(default, rename = "20OT")]
    pub ot20: Option<u32>,
    #[serde(default, rename = "40OT")]
    pub ot40: Option<u32>,
    #[serde(default, rename = "20FR")]
    pub fr20: Option<u32>,
    #[serde(default, rename = "40FR")]
    pub fr40: Option<u32>,
    #[serde(default, rename = "20TK")]
    pub tk20: Option<u32>,
    #[serde(default, rename = "45HC")]
    pub hc45: Option<u32>,
    /// Accepted for compatibility with the dashboard form; the stored total is
    /// always recomputed from the counts.
    #[serde(default)]
    pub total: Option<u64>,
}

impl AgentPatch {
    fn count(&self, kind: ContainerType) -> Option<u32> {
        match kind {
            ContainerType::Gp20 => self.gp20,
            ContainerType::Hc40 => self.hc40,
            ContainerType::Rf20 => self.rf20,
            ContainerType::Rf40 => self.rf40,
            ContainerType::Ot20 => self.ot20,
            ContainerType::Ot40 => self.ot40,
            ContainerType::Fr20 => self.fr20,
            ContainerType::Fr40 => self.fr40,
            ContainerType::Tk20 => self.tk20,
            ContainerType::Hc45 => self.hc45,
        }
    }

    pub fn apply(&self, agent: &mut AgentRecord) {
        if let Some(name) = &self.name {
            agent.name = name.trim().to_string();
        }
        for kind in ContainerType::ALL {
            if let Some(value) = self.count(kind) {
                agent.counts.set(kind, value);
            }
        }
        agent.refresh_total();
    }
}
