// src/dag/thunk.rs

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use blake3::Hasher;
use serde::{Deserialize, Serialize};

use crate::store::pool::Chunk;

/// Stable, content-independent identifier of a thunk: a BLAKE3 hash over
/// the thunk's structural fingerprint (executable kind, operation label,
/// flags, input fingerprints).
///
/// Equal ids denote the same computation; results are keyed by `TaskId`
/// in the metadata store, so structurally shared subgraphs are computed
/// once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId([u8; 32]);

impl TaskId {
    /// Abbreviated hex form for log fields.
    pub fn short(&self) -> String {
        self.0[..6].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.iter() {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Dynamic value domain flowing through thunk functions.
///
/// Serde-serializable so chunk payloads can spill to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Unit,
    Int(i64),
    Float(f64),
    FloatVec(Vec<f64>),
    List(Vec<Value>),
    Chunk(Chunk),
}

impl Value {
    pub fn expect_int(&self) -> Result<i64> {
        match self {
            Value::Int(n) => Ok(*n),
            other => Err(anyhow::anyhow!("expected Int, got {}", other.kind())),
        }
    }

    pub fn expect_float_vec(self) -> Result<Vec<f64>> {
        match self {
            Value::FloatVec(v) => Ok(v),
            other => Err(anyhow::anyhow!("expected FloatVec, got {}", other.kind())),
        }
    }

    pub fn expect_list(self) -> Result<Vec<Value>> {
        match self {
            Value::List(v) => Ok(v),
            other => Err(anyhow::anyhow!("expected List, got {}", other.kind())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Unit => "Unit",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::FloatVec(_) => "FloatVec",
            Value::List(_) => "List",
            Value::Chunk(_) => "Chunk",
        }
    }
}

/// Function applied to the collected argument vector of a `Func` thunk.
pub type ThunkFn = Arc<dyn Fn(Vec<Value>) -> Result<Value> + Send + Sync>;

/// Zero-argument function backing a `Nullary` thunk (e.g. a partition
/// generator). Distinct generators must carry distinct labels, since the
/// label is all their fingerprints differ by.
pub type NullaryFn = Arc<dyn Fn() -> Result<Value> + Send + Sync>;

/// One input position of a `Func` thunk.
#[derive(Clone)]
pub enum Input {
    /// Another DAG node; its result is resolved through the metadata store.
    Thunk(Arc<Thunk>),
    /// A pre-materialized chunk handle supplied by the driver.
    Chunk(Chunk),
    /// A literal value, passed through as-is.
    Literal(Value),
}

/// What a thunk executes, as a tagged variant dispatched in `exec`.
#[derive(Clone)]
pub enum Executable {
    /// A function over ordered inputs.
    Func {
        label: String,
        f: ThunkFn,
        inputs: Vec<Input>,
    },
    /// A plain function invoked with no arguments.
    Nullary { label: String, f: NullaryFn },
    /// A chunk handle taken as the task's result.
    Chunk(Chunk),
    /// A literal value taken as the task's result.
    Literal(Value),
}

impl Executable {
    pub fn label(&self) -> &str {
        match self {
            Executable::Func { label, .. } | Executable::Nullary { label, .. } => label,
            Executable::Chunk(_) => "<chunk>",
            Executable::Literal(_) => "<literal>",
        }
    }
}

/// An immutable DAG node: an executable plus placement/retention flags.
///
/// - `meta`: the function receives chunk arguments uncollected.
/// - `get_result`: the raw result is stored; when false the scheduler
///   boxes the result into a chunk.
/// - `persist` / `cache`: retention flags propagated onto boxed chunks.
///
/// Thunks form a DAG rooted at the single node submitted to the driver;
/// they are built once and never mutated.
pub struct Thunk {
    id: TaskId,
    exec: Executable,
    meta: bool,
    get_result: bool,
    persist: bool,
    cache: bool,
}

impl Thunk {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn exec(&self) -> &Executable {
        &self.exec
    }

    pub fn label(&self) -> &str {
        self.exec.label()
    }

    pub fn meta(&self) -> bool {
        self.meta
    }

    pub fn get_result(&self) -> bool {
        self.get_result
    }

    pub fn persist(&self) -> bool {
        self.persist
    }

    pub fn cache(&self) -> bool {
        self.cache
    }

    /// True for nodes whose inputs gate runnability.
    pub fn is_func(&self) -> bool {
        matches!(self.exec, Executable::Func { .. })
    }

    /// True when `exec` wraps this node's result into a chunk: any
    /// computed thunk (`Func` or `Nullary`) that lacks `get_result`.
    /// `Chunk` and `Literal` executables pass through as-is.
    pub fn boxes_result(&self) -> bool {
        matches!(
            self.exec,
            Executable::Func { .. } | Executable::Nullary { .. }
        ) && !self.get_result
    }
}

impl fmt::Debug for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thunk")
            .field("id", &self.id.short())
            .field("label", &self.label())
            .field("meta", &self.meta)
            .field("get_result", &self.get_result)
            .finish()
    }
}

/// Builder for [`Thunk`]s. Computes the structural fingerprint at `build`.
pub struct ThunkBuilder {
    exec: Executable,
    meta: bool,
    get_result: bool,
    persist: bool,
    cache: bool,
}

impl ThunkBuilder {
    pub fn func(label: impl Into<String>, f: ThunkFn, inputs: Vec<Input>) -> Self {
        Self::new(Executable::Func {
            label: label.into(),
            f,
            inputs,
        })
    }

    pub fn nullary(label: impl Into<String>, f: NullaryFn) -> Self {
        Self::new(Executable::Nullary {
            label: label.into(),
            f,
        })
    }

    pub fn literal(value: Value) -> Self {
        Self::new(Executable::Literal(value))
    }

    pub fn chunk(chunk: Chunk) -> Self {
        Self::new(Executable::Chunk(chunk))
    }

    fn new(exec: Executable) -> Self {
        Self {
            exec,
            meta: false,
            get_result: false,
            persist: false,
            cache: false,
        }
    }

    /// Pass chunk arguments to the function uncollected.
    pub fn meta(mut self, yes: bool) -> Self {
        self.meta = yes;
        self
    }

    /// Store the raw result instead of boxing it into a chunk.
    pub fn get_result(mut self, yes: bool) -> Self {
        self.get_result = yes;
        self
    }

    pub fn persist(mut self, yes: bool) -> Self {
        self.persist = yes;
        self
    }

    pub fn cache(mut self, yes: bool) -> Self {
        self.cache = yes;
        self
    }

    pub fn build(self) -> Arc<Thunk> {
        let id = fingerprint(&self.exec, self.meta, self.get_result, self.persist, self.cache);
        Arc::new(Thunk {
            id,
            exec: self.exec,
            meta: self.meta,
            get_result: self.get_result,
            persist: self.persist,
            cache: self.cache,
        })
    }
}

/// Hash the structural fingerprint of a node.
///
/// Inputs contribute their own fingerprints (child task ids, chunk
/// handles, literal encodings), so the id of a node pins down the whole
/// subgraph below it without being sensitive to pointer identity.
fn fingerprint(exec: &Executable, meta: bool, get_result: bool, persist: bool, cache: bool) -> TaskId {
    let mut hasher = Hasher::new();
    hasher.update(&[meta as u8, get_result as u8, persist as u8, cache as u8]);

    match exec {
        Executable::Func { label, inputs, .. } => {
            hasher.update(b"func");
            hasher.update(label.as_bytes());
            for input in inputs.iter() {
                match input {
                    Input::Thunk(t) => {
                        hasher.update(b"T");
                        hasher.update(&t.id().0);
                    }
                    Input::Chunk(c) => {
                        hasher.update(b"C");
                        hasher.update(&c.handle().to_le_bytes());
                    }
                    Input::Literal(v) => {
                        hasher.update(b"L");
                        hash_value(&mut hasher, v);
                    }
                }
            }
        }
        Executable::Nullary { label, .. } => {
            hasher.update(b"nullary");
            hasher.update(label.as_bytes());
        }
        Executable::Chunk(c) => {
            hasher.update(b"chunk");
            hasher.update(&c.handle().to_le_bytes());
        }
        Executable::Literal(v) => {
            hasher.update(b"literal");
            hash_value(&mut hasher, v);
        }
    }

    TaskId(hasher.finalize().into())
}

fn hash_value(hasher: &mut Hasher, value: &Value) {
    // Literals are small (large data enters the DAG as chunks), so the
    // JSON encoding is an acceptable canonical form to hash.
    match serde_json::to_vec(value) {
        Ok(bytes) => {
            hasher.update(&bytes);
        }
        Err(_) => {
            hasher.update(b"<unencodable>");
        }
    }
}
