//! Spreadsheet-to-store importer.
//!
//! The inventory sheet is a sequence of blocks: a row naming a port city,
//! usually a header row (`AGENTS | 20'GP | 40'HC | ...`), then one row per
//! shipping agent with the ten container counts. Rows are classified one at a
//! time and the "current city" is carried forward as fold state.

use std::collections::BTreeSet;

use log::{debug, info};

use crate::cell::CellValue;
use crate::port::{AgentRecord, ContainerCounts, ContainerType, normalize_city};
use crate::store::{PortStore, StoreResult};

/// Number of container columns following the label cell
const CONTAINER_COLUMNS: usize = ContainerType::ALL.len();

/// What a single sheet row means to the importer
#[derive(Debug, Clone, PartialEq)]
pub enum RowKind {
    /// Blank label cell
    Skip,
    /// Table heading such as `AGENTS | 20'GP | ...`
    Header,
    /// Introduces a port; holds the normalized city name
    City(String),
    /// One agent's counts for the current city
    Agent(AgentRecord),
}

/// Classify one raw sheet row.
///
/// Header detection wins over everything else, so a heading row is skipped
/// even when it carries numbers. A row counts as agent data when any of the
/// ten container cells is numeric; otherwise its label names a city.
pub fn classify_row(row: &[CellValue]) -> RowKind {
    let label = row.first().and_then(CellValue::as_label);

    if is_header(label.as_deref(), row) {
        return RowKind::Header;
    }

    let Some(label) = label else {
        return RowKind::Skip;
    };

    let has_data = row
        .iter()
        .skip(1)
        .take(CONTAINER_COLUMNS)
        .any(CellValue::is_numeric);

    if has_data {
        RowKind::Agent(parse_agent(label, row))
    } else {
        RowKind::City(normalize_city(&label))
    }
}

fn is_header(label: Option<&str>, row: &[CellValue]) -> bool {
    if let Some(label) = label {
        let upper = label.to_uppercase();
        if upper == "AGENTS" || upper == "AGENT" {
            return true;
        }
    }
    row.iter().any(|cell| match cell {
        CellValue::Text(s) => s.to_uppercase().contains("20'GP"),
        _ => false,
    })
}

// Any "total" cell at index 11 is ignored; the total is always recomputed.
fn parse_agent(name: String, row: &[CellValue]) -> AgentRecord {
    let mut counts = ContainerCounts::default();
    for kind in ContainerType::ALL {
        let value = row.get(kind.index() + 1).map_or(0, CellValue::as_count);
        counts.set(kind, value);
    }
    AgentRecord::new(name, counts)
}

/// Outcome of one import run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Cities introduced by a city row, in first-seen order
    pub cities: Vec<String>,
    /// Agent rows written to the store
    pub agents: usize,
    /// Rows skipped as blank, header, or agent data before any city
    pub skipped: usize,
}

impl ImportSummary {
    pub fn message(&self) -> String {
        format!("Processed {} cities", self.cities.len())
    }
}

/// Fold state threaded through the row loop
#[derive(Default)]
struct Cursor {
    current_city: Option<String>,
    seen: BTreeSet<String>,
    summary: ImportSummary,
}

impl Cursor {
    fn apply<S: PortStore + ?Sized>(&mut self, store: &S, kind: RowKind) -> StoreResult<()> {
        match kind {
            RowKind::Skip | RowKind::Header => self.summary.skipped += 1,
            RowKind::City(city) => {
                store.create_city(&city)?;
                if self.seen.insert(city.clone()) {
                    self.summary.cities.push(city.clone());
                }
                self.current_city = Some(city);
            }
            RowKind::Agent(agent) => match &self.current_city {
                Some(city) => {
                    store.replace_agent(city, agent)?;
                    self.summary.agents += 1;
                }
                None => {
                    debug!("Dropping agent row {:?} with no city above it", agent.name);
                    self.summary.skipped += 1;
                }
            },
        }
        Ok(())
    }
}

/// Import sheet rows into `store`, strictly in order.
///
/// A store failure aborts the run; rows applied before the failure stay
/// applied.
pub fn import_rows<S, I>(store: &S, rows: I) -> StoreResult<ImportSummary>
where
    S: PortStore + ?Sized,
    I: IntoIterator,
    I::Item: AsRef<[CellValue]>,
{
    let mut cursor = Cursor::default();
    for row in rows {
        let row = row.as_ref();
        if row.is_empty() {
            continue;
        }
        cursor.apply(store, classify_row(row))?;
    }

    let summary = cursor.summary;
    info!(
        "Import finished: {} cities, {} agents, {} rows skipped",
        summary.cities.len(),
        summary.agents,
        summary.skipped
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortRecord;
    use crate::store::{MemoryStore, StoreError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn row(cells: &[CellValue]) -> Vec<CellValue> {
        cells.to_vec()
    }

    fn text(s: &str) -> CellValue {
        CellValue::from(s)
    }

    fn num(n: f64) -> CellValue {
        CellValue::Number(n)
    }

    fn agent_row(name: &str, counts: [f64; 10]) -> Vec<CellValue> {
        let mut cells = vec![text(name)];
        cells.extend(counts.iter().map(|n| num(*n)));
        cells
    }

    fn header_row() -> Vec<CellValue> {
        let mut cells = vec![text("AGENTS")];
        cells.extend(ContainerType::ALL.iter().map(|t| text(t.sheet_heading())));
        cells.push(text("TOTAL"));
        cells
    }

    fn agent_names(port: &PortRecord) -> Vec<&str> {
        port.agents.iter().map(|a| a.name.as_str()).collect()
    }

    #[test]
    fn chennai_goodrich_example() {
        let store = MemoryStore::new();
        let rows = vec![
            row(&[text("CHENNAI")]),
            agent_row("GOODRICH", [31.0, 28.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0]),
        ];

        let summary = import_rows(&store, &rows).unwrap();
        assert_eq!(summary.message(), "Processed 1 cities");

        let chennai = store.find_by_city("CHENNAI").unwrap().unwrap();
        assert_eq!(agent_names(&chennai), ["GOODRICH"]);
        assert_eq!(chennai.agents[0].total, 62);
        assert_eq!(chennai.agents[0].counts.tk20, 1);
    }

    #[test]
    fn total_cell_is_ignored() {
        let mut cells = agent_row("SHIPCO", [1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 4.0]);
        cells.push(num(999.0));

        match classify_row(&cells) {
            RowKind::Agent(agent) => {
                assert_eq!(agent.total, 10);
                assert_eq!(agent.total, agent.counts.sum());
            }
            other => panic!("expected agent row, got {:?}", other),
        }
    }

    #[test]
    fn non_numeric_and_missing_cells_default_to_zero() {
        let cells = vec![text("  Evergreen "), text("5"), text("n/a"), CellValue::Empty, num(2.0)];
        match classify_row(&cells) {
            RowKind::Agent(agent) => {
                assert_eq!(agent.name, "Evergreen");
                assert_eq!(agent.counts.gp20, 5);
                assert_eq!(agent.counts.hc40, 0);
                assert_eq!(agent.counts.rf40, 2);
                assert_eq!(agent.total, 7);
            }
            other => panic!("expected agent row, got {:?}", other),
        }
    }

    #[test]
    fn header_rows_are_recognized() {
        assert_eq!(classify_row(&header_row()), RowKind::Header);
        assert_eq!(classify_row(&[text(" agent "), num(4.0)]), RowKind::Header);
        assert_eq!(
            classify_row(&[text("Line"), text("20'gp"), num(3.0)]),
            RowKind::Header
        );
        assert_eq!(
            classify_row(&[CellValue::Empty, text("20'GP"), text("40'HC")]),
            RowKind::Header
        );
    }

    #[test]
    fn blank_label_rows_are_skipped() {
        assert_eq!(classify_row(&[CellValue::Empty, num(3.0)]), RowKind::Skip);
        assert_eq!(classify_row(&[text("   "), num(3.0)]), RowKind::Skip);
    }

    #[test]
    fn city_rows_are_uppercased() {
        assert_eq!(
            classify_row(&[text(" Nhava Sheva "), text("(JNPT)")]),
            RowKind::City("NHAVA SHEVA".into())
        );
        // Numbers beyond the ten container columns do not make an agent row
        let mut cells = vec![text("tuticorin")];
        cells.extend(std::iter::repeat_n(CellValue::Empty, 10));
        cells.push(num(12.0));
        assert_eq!(classify_row(&cells), RowKind::City("TUTICORIN".into()));
    }

    #[test]
    fn skipped_rows_never_create_records() {
        let store = MemoryStore::new();
        let rows = vec![
            header_row(),
            row(&[CellValue::Empty, num(5.0), num(6.0)]),
            agent_row("ORPHAN", [1.0; 10]),
            row(&[text("AGENTS"), num(1.0), num(2.0)]),
        ];

        let summary = import_rows(&store, &rows).unwrap();
        assert!(store.list().unwrap().is_empty());
        assert_eq!(summary.cities.len(), 0);
        assert_eq!(summary.skipped, 4);
    }

    #[test]
    fn reimport_is_idempotent() {
        let store = MemoryStore::new();
        let rows = vec![
            row(&[text("MUMBAI")]),
            header_row(),
            agent_row("SHIPCO", [1.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            agent_row("MAERSK", [4.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]),
            row(&[]),
            row(&[text("Kolkata")]),
            agent_row("CMA CGM", [0.0, 7.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        ];

        import_rows(&store, &rows).unwrap();
        let first: Vec<(String, Vec<AgentRecord>)> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|p| (p.city, p.agents))
            .collect();

        let summary = import_rows(&store, &rows).unwrap();
        let second: Vec<(String, Vec<AgentRecord>)> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|p| (p.city, p.agents))
            .collect();

        assert_eq!(first, second);
        assert_eq!(summary.cities, ["MUMBAI", "KOLKATA"]);
        assert_eq!(summary.agents, 3);
    }

    #[test]
    fn reimported_agent_replaces_prior_entry() {
        let store = MemoryStore::new();
        store
            .upsert_city(
                "MUMBAI",
                vec![AgentRecord::new(
                    "SHIPCO",
                    ContainerCounts {
                        gp20: 50,
                        hc40: 50,
                        ..Default::default()
                    },
                )],
            )
            .unwrap();

        let rows = vec![
            row(&[text("Mumbai")]),
            agent_row("SHIPCO", [3.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2.0]),
        ];
        import_rows(&store, &rows).unwrap();

        let mumbai = store.find_by_city("MUMBAI").unwrap().unwrap();
        assert_eq!(mumbai.agents.len(), 1);
        assert_eq!(mumbai.agents[0].total, 5);
        assert_eq!(mumbai.agents[0].counts.hc40, 0);
    }

    #[test]
    fn replaced_agents_move_to_the_end() {
        let store = MemoryStore::new();
        let rows = vec![
            row(&[text("GOA")]),
            agent_row("A", [1.0; 10]),
            agent_row("B", [1.0; 10]),
            agent_row("A", [2.0; 10]),
        ];
        import_rows(&store, &rows).unwrap();

        let goa = store.find_by_city("GOA").unwrap().unwrap();
        assert_eq!(agent_names(&goa), ["B", "A"]);
        assert_eq!(goa.agent("A").unwrap().total, 20);
    }

    #[test]
    fn city_mentioned_twice_counts_once() {
        let store = MemoryStore::new();
        let rows = vec![
            row(&[text("VIZAG")]),
            row(&[text("CHENNAI")]),
            row(&[text("vizag ")]),
        ];
        let summary = import_rows(&store, &rows).unwrap();
        assert_eq!(summary.message(), "Processed 2 cities");
    }

    /// Memory store that starts failing after `writes` successful mutations
    struct FlakyStore {
        inner: MemoryStore,
        writes: AtomicUsize,
    }

    impl FlakyStore {
        fn new(writes: usize) -> Self {
            FlakyStore {
                inner: MemoryStore::new(),
                writes: AtomicUsize::new(writes),
            }
        }

        fn spend(&self) -> StoreResult<()> {
            self.writes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .map(|_| ())
                .map_err(|_| StoreError::Io(std::io::Error::other("disk full")))
        }
    }

    impl PortStore for FlakyStore {
        fn list(&self) -> StoreResult<Vec<PortRecord>> {
            self.inner.list()
        }
        fn find_by_city(&self, city: &str) -> StoreResult<Option<PortRecord>> {
            self.inner.find_by_city(city)
        }
        fn create_city(&self, city: &str) -> StoreResult<PortRecord> {
            self.spend()?;
            self.inner.create_city(city)
        }
        fn remove_agent(&self, city: &str, name: &str) -> StoreResult<bool> {
            self.spend()?;
            self.inner.remove_agent(city, name)
        }
        fn append_agent(&self, city: &str, agent: AgentRecord) -> StoreResult<bool> {
            self.spend()?;
            self.inner.append_agent(city, agent)
        }
        fn replace_agent(&self, city: &str, agent: AgentRecord) -> StoreResult<bool> {
            self.spend()?;
            self.inner.replace_agent(city, agent)
        }
        fn upsert_city(&self, city: &str, agents: Vec<AgentRecord>) -> StoreResult<PortRecord> {
            self.spend()?;
            self.inner.upsert_city(city, agents)
        }
        fn update_agent(
            &self,
            city: &str,
            name: &str,
            patch: &crate::port::AgentPatch,
        ) -> StoreResult<Option<PortRecord>> {
            self.spend()?;
            self.inner.update_agent(city, name, patch)
        }
        fn delete_city(&self, city: &str) -> StoreResult<bool> {
            self.spend()?;
            self.inner.delete_city(city)
        }
    }

    #[test]
    fn store_failure_aborts_import() {
        let rows = vec![row(&[text("CHENNAI")]), agent_row("GOODRICH", [1.0; 10])];
        let store = FlakyStore::new(0);
        assert!(import_rows(&store, &rows).is_err());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn rows_before_a_store_failure_stay_applied() {
        let rows = vec![
            row(&[text("CHENNAI")]),
            agent_row("GOODRICH", [31.0, 28.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0]),
            row(&[text("MUMBAI")]),
            agent_row("SHIPCO", [1.0; 10]),
        ];
        // CHENNAI and GOODRICH succeed, creating MUMBAI fails
        let store = FlakyStore::new(2);
        assert!(import_rows(&store, &rows).is_err());

        let chennai = store.find_by_city("CHENNAI").unwrap().unwrap();
        assert_eq!(chennai.agent("GOODRICH").unwrap().total, 62);
        assert!(store.find_by_city("MUMBAI").unwrap().is_none());
    }

    #[test]
    fn oversized_cells_clamp_instead_of_overflowing() {
        let store = MemoryStore::new();
        let rows = vec![
            row(&[text("CHENNAI")]),
            row(&[text("BIG"), num(1e19), num(1e19)]),
        ];
        import_rows(&store, &rows).unwrap();

        let big = store.find_by_city("CHENNAI").unwrap().unwrap();
        let big = big.agent("BIG").unwrap();
        assert_eq!(big.counts.gp20, u32::MAX);
        assert_eq!(big.counts.hc40, u32::MAX);
        assert_eq!(big.total, 2 * u64::from(u32::MAX));
        assert_eq!(big.total, big.counts.sum());
    }
}
