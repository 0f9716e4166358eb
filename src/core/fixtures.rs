//! Shared test fixtures: two in-memory readers and their topology.
//!
//! ```text
//! r1.t1 {id, a}  --a=b-->  r1.t2 {id, b, c}  --id=t2_id-->  r2.t3 {id, t2_id}
//! r2.t1 {id}
//! ```

use super::topology::{ReaderTopologyLoader, Topology, TopologyLoader};
use crate::reader::memory::MemoryReader;
use crate::reader::Reader;
use std::sync::Arc;

pub const R1_ITEMS: &str = r#"{"items":[
    {"type":"r1.t1","attrs":[{"field":"id"},{"field":"a"}]},
    {"type":"r1.t2","attrs":[{"field":"id"},{"field":"b"},{"field":"c","isExtra":true}]}
]}"#;

pub const R1_LINKS: &str = r#"{"links":[
    {"from":"r1.t1","to":"r1.t2","mapping":{"from":"a","to":"b"}},
    {"from":"r1.t2","to":"r2.t3","mapping":{"from":"id","to":"t2_id"}}
]}"#;

pub const R2_ITEMS: &str = r#"{"items":[
    {"type":"r2.t3","attrs":[{"field":"id"},{"field":"t2_id"}]},
    {"type":"r2.t1","attrs":[{"field":"id"}]}
]}"#;

pub const R2_LINKS: &str = r#"{"links":[]}"#;

pub fn r1() -> MemoryReader {
    MemoryReader::new("r1", &["dev", "prod"]).with_schemas(R1_ITEMS, R1_LINKS)
}

pub fn r2() -> MemoryReader {
    MemoryReader::new("r2", &["ops"]).with_schemas(R2_ITEMS, R2_LINKS)
}

/// Root records `{id:1,a:x}`, `{id:2,a:y}`; one `t2` with `b=x`; one `t3` under it.
pub fn populated() -> Vec<Arc<dyn Reader>> {
    let r1 = r1()
        .with_record("dev", "t1", &[("id", "1"), ("a", "x")])
        .with_record("dev", "t1", &[("id", "2"), ("a", "y")])
        .with_record("dev", "t2", &[("id", "20"), ("b", "x"), ("c", "3")])
        .with_record("dev", "t2", &[("id", "21"), ("b", "z"), ("c", "4")]);
    let r2 = r2().with_record("ops", "t3", &[("id", "300"), ("t2_id", "20")]);
    vec![Arc::new(r1), Arc::new(r2)]
}

pub fn topology(readers: &[Arc<dyn Reader>]) -> Topology {
    ReaderTopologyLoader::new(readers.to_vec())
        .load()
        .unwrap()
}
