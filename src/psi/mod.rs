//! PSI/SI tables: one module per table, each with its `build_*` and `parse_*`.

pub mod section;
pub mod pat;
pub mod pmt;
pub mod cat;
pub mod sdt;
pub mod eit;
pub mod nit;
pub mod tdt;

pub use section::{Section, SectionReader};
pub use pat::{build_pat, parse_pat, PatTable};
pub use pmt::{build_pmt, parse_pmt, PmtTable};
pub use cat::{build_cat, parse_cat, CatTable};
pub use sdt::{build_sdt, parse_sdt, SdtTable, ServiceInfo};
pub use eit::{build_eit, parse_eit, EitTable};
pub use nit::{build_nit, parse_nit, NitTable, TransportStreamEntry};
pub use tdt::{build_tdt, parse_tdt};
