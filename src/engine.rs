//! Matching and enrichment engine.
//!
//! This module is the operational core of the crate. Rule data (templates,
//! dispatch tables, chains, lookup tables) is compiled once at load time into
//! immutable values; per-record processing is pure computation over those
//! values and the caller's record.
//!
//! ## How the parts work together
//!
//! Processing one record is a pipeline:
//!
//! ```text
//! rule data ──── defs::compile_rule_set ──▶ DispatchTable + Arc<Chain>s (frozen)
//!                                               │
//! record.message ── DispatchTable::dispatch ────┤  header templates, declared order;
//!                   (dispatch.rs)               │  exact message-key lookup
//!                                               ▼
//!                        PayloadParser (template.rs | tagval.rs)
//!                          - bind payload fields, or pass through
//!                                               │
//!                                               ▼
//!                        Chain::run (chain.rs)
//!                          - constant / copy / lookup steps
//!                          - timestamp compose (datetime.rs)
//!                          - registrable-domain split (domain.rs)
//!                          - shared sub-chains
//!                                               │
//!                                               ▼
//!                                       enriched record
//! ```
//!
//! ## Responsibilities by module
//!
//! - `template.rs`: compiles `%{placeholder}` line templates and matches them
//!   with "consume until literal" semantics — no backtracking, deterministic
//!   split points.
//! - `tagval.rs`: decodes delimited `key=value` payloads under a per-vendor
//!   separator/quote policy; all-or-nothing.
//! - `datetime.rs`: composes absolute timestamps from captured component
//!   fields against ordered format alternatives.
//! - `domain.rs`: longest-suffix registrable-domain extraction.
//! - `chain.rs`: runs ordered, shared, immutable enrichment chains.
//! - `dispatch.rs`: two-stage header/message selection.
//!
//! ## Sharing discipline
//!
//! Everything compiled here is read-only after construction and `Send + Sync`:
//! the host may call `Pipeline::process` from arbitrarily many threads against
//! the same tables without locking. The only mutable state in a call is the
//! caller-owned record, and no reference to it is retained past the return.
//!
//! ## Debugging
//!
//! The engine emits `tracing` events (`debug`/`trace`) for rule selection and
//! recovered per-record failures; point an `EnvFilter` at `siftline=debug` to
//! see why a line did or did not match.

#[path = "engine/chain.rs"]
mod chain;
#[path = "engine/datetime.rs"]
mod datetime;
#[path = "engine/dispatch.rs"]
mod dispatch;
#[path = "engine/domain.rs"]
mod domain;
#[path = "engine/tagval.rs"]
mod tagval;
#[path = "engine/template.rs"]
mod template;

pub use chain::{Chain, ChainFlags, LookupTable, Step};
pub use datetime::{DateToken, TimestampDefaults, compose};
pub(crate) use datetime::parse_offset;
pub use dispatch::{Dispatch, DispatchTable, HeaderRule, MessageRule, PayloadParser};
pub use domain::registrable_domain;
pub use tagval::{TagValParser, TagValPolicy, decode as decode_tags};
pub use template::Matcher;
