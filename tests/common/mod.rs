#![allow(dead_code)]

use std::{
    fs,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    path::Path,
};

use serde_json::Value;
use tempfile::TempDir;

const METADATA_MARKER: &[u8] = b"\xab\xcd\xefMaxMind.com";
const DATA_SEPARATOR: usize = 16;

const TYPE_UTF8: u8 = 2;
const TYPE_DOUBLE: u8 = 3;
const TYPE_UINT16: u8 = 5;
const TYPE_UINT32: u8 = 6;
const TYPE_MAP: u8 = 7;
const TYPE_INT32: u8 = 8;
const TYPE_UINT64: u8 = 9;
const TYPE_ARRAY: u8 = 11;
const TYPE_BOOL: u8 = 14;

#[derive(Clone, Copy)]
enum Slot {
    Node(usize),
    Empty,
    Data(usize),
}

/// Writes an IPv4 MaxMind DB with 24-bit records mapping each CIDR to its value.
pub fn write_db(path: &Path, networks: &[(&str, Value)]) {
    let mut tree = Tree::default();
    for (cidr, value) in networks {
        let (addr, len) = split_cidr(cidr);
        let addr: Ipv4Addr = addr.parse().expect("ipv4 address");
        tree.insert_data(u128::from(u32::from(addr)), len, 32, value);
    }
    tree.write(path, 4);
}

/// Writes an IPv6 MaxMind DB. IPv4 CIDRs land in the `::/96` subtree, and
/// `::ffff:0:0/96` and `2002::/16` point at that subtree the way published
/// databases alias it.
pub fn write_ipv6_db(path: &Path, networks: &[(&str, Value)]) {
    let mut tree = Tree::default();
    for (cidr, value) in networks {
        let (addr, len) = split_cidr(cidr);
        match addr.parse::<IpAddr>().expect("ip address") {
            IpAddr::V4(v4) => tree.insert_data(u128::from(u32::from(v4)), len + 96, 128, value),
            IpAddr::V6(v6) => tree.insert_data(u128::from(v6), len, 128, value),
        }
    }

    let mut ipv4_root = 0;
    for _ in 0..96 {
        ipv4_root = tree.child(ipv4_root, 0);
    }
    let mapped = u128::from(Ipv6Addr::new(0, 0, 0, 0, 0, 0xffff, 0, 0));
    let six_to_four = u128::from(Ipv6Addr::new(0x2002, 0, 0, 0, 0, 0, 0, 0));
    tree.insert(mapped, 96, 128, Slot::Node(ipv4_root));
    tree.insert(six_to_four, 16, 128, Slot::Node(ipv4_root));

    tree.write(path, 6);
}

fn split_cidr(cidr: &str) -> (&str, usize) {
    let (addr, len) = cidr.split_once('/').expect("cidr");
    (addr, len.parse().expect("prefix length"))
}

struct Tree {
    nodes: Vec<[Slot; 2]>,
    data: Vec<u8>,
}

impl Default for Tree {
    fn default() -> Self {
        Self {
            nodes: vec![[Slot::Empty, Slot::Empty]],
            data: Vec::new(),
        }
    }
}

impl Tree {
    fn insert_data(&mut self, bits: u128, len: usize, width: usize, value: &Value) {
        let offset = self.data.len();
        encode(value, &mut self.data);
        self.insert(bits, len, width, Slot::Data(offset));
    }

    fn insert(&mut self, bits: u128, len: usize, width: usize, slot: Slot) {
        assert!((1..=width).contains(&len), "prefix length 1..={width}");
        let mut node = 0;
        for depth in 0..len {
            let bit = ((bits >> (width - 1 - depth)) & 1) as usize;
            if depth == len - 1 {
                self.nodes[node][bit] = slot;
                return;
            }
            node = self.child(node, bit);
        }
    }

    fn child(&mut self, node: usize, bit: usize) -> usize {
        match self.nodes[node][bit] {
            Slot::Node(next) => next,
            _ => {
                self.nodes.push([Slot::Empty, Slot::Empty]);
                let next = self.nodes.len() - 1;
                self.nodes[node][bit] = Slot::Node(next);
                next
            }
        }
    }

    fn write(&self, path: &Path, ip_version: u64) {
        let node_count = self.nodes.len();
        let mut out = Vec::new();
        for node in &self.nodes {
            for slot in node {
                let value = match *slot {
                    Slot::Node(next) => next,
                    Slot::Empty => node_count,
                    Slot::Data(offset) => node_count + DATA_SEPARATOR + offset,
                };
                out.extend_from_slice(&(value as u32).to_be_bytes()[1..]);
            }
        }
        out.extend_from_slice(&[0; DATA_SEPARATOR]);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(METADATA_MARKER);
        encode_metadata(node_count as u32, ip_version, &mut out);

        fs::write(path, out).expect("write database");
    }
}

/// A temporary directory holding `test.mmdb` built from `networks`.
pub fn temp_db(networks: &[(&str, Value)]) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("test.mmdb");
    write_db(&path, networks);
    (dir, path)
}

/// Like [`temp_db`] for an IPv6 database written by [`write_ipv6_db`].
pub fn temp_ipv6_db(networks: &[(&str, Value)]) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("test-v6.mmdb");
    write_ipv6_db(&path, networks);
    (dir, path)
}

fn encode_metadata(node_count: u32, ip_version: u64, out: &mut Vec<u8>) {
    control(out, TYPE_MAP, 9);
    string("binary_format_major_version", out);
    uint(out, TYPE_UINT16, 2);
    string("binary_format_minor_version", out);
    uint(out, TYPE_UINT16, 0);
    string("build_epoch", out);
    uint(out, TYPE_UINT64, 1_700_000_000);
    string("database_type", out);
    string("Test-City", out);
    string("description", out);
    control(out, TYPE_MAP, 1);
    string("en", out);
    string("fixture database", out);
    string("ip_version", out);
    uint(out, TYPE_UINT16, ip_version);
    string("languages", out);
    control(out, TYPE_ARRAY, 1);
    string("en", out);
    string("node_count", out);
    uint(out, TYPE_UINT32, u64::from(node_count));
    string("record_size", out);
    uint(out, TYPE_UINT16, 24);
}

fn encode(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::String(s) => string(s, out),
        Value::Bool(b) => control(out, TYPE_BOOL, usize::from(*b)),
        Value::Array(items) => {
            control(out, TYPE_ARRAY, items.len());
            for item in items {
                encode(item, out);
            }
        }
        Value::Object(map) => {
            control(out, TYPE_MAP, map.len());
            for (key, value) in map {
                string(key, out);
                encode(value, out);
            }
        }
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                uint(out, TYPE_UINT64, u);
            } else if let Some(i) = n.as_i64() {
                control(out, TYPE_INT32, 4);
                out.extend_from_slice(&(i as i32).to_be_bytes());
            } else {
                let f = n.as_f64().expect("finite number");
                control(out, TYPE_DOUBLE, 8);
                out.extend_from_slice(&f.to_be_bytes());
            }
        }
        Value::Null => panic!("the format has no null"),
    }
}

fn string(s: &str, out: &mut Vec<u8>) {
    control(out, TYPE_UTF8, s.len());
    out.extend_from_slice(s.as_bytes());
}

fn uint(out: &mut Vec<u8>, type_num: u8, value: u64) {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    control(out, type_num, bytes.len() - skip);
    out.extend_from_slice(&bytes[skip..]);
}

fn control(out: &mut Vec<u8>, type_num: u8, size: usize) {
    let (size_bits, extra): (u8, Vec<u8>) = if size < 29 {
        (size as u8, Vec::new())
    } else if size < 285 {
        (29, vec![(size - 29) as u8])
    } else if size < 65_821 {
        (30, ((size - 285) as u16).to_be_bytes().to_vec())
    } else {
        (31, ((size - 65_821) as u32).to_be_bytes()[1..].to_vec())
    };
    if type_num <= 7 {
        out.push((type_num << 5) | size_bits);
    } else {
        out.push(size_bits);
        out.push(type_num - 7);
    }
    out.extend_from_slice(&extra);
}
