pub mod io;
pub mod logging;
pub mod paths;
