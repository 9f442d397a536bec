pub mod entry;
pub mod pool;
pub mod scripts;
pub mod syntax;

pub use entry::{
    ConversionResult, ConversionTask, MapperInput, OffsetMapper, SkipPredicate, Timings,
    convert_entry,
};
pub use pool::{
    PoolConfig, TaskHandle, WorkerPool, default_pool, default_worker_count, reset_default_pool,
};
pub use scripts::{
    NoPositionMaps, PositionMapResolver, ScriptConversion, build_tasks, convert_scripts,
};
