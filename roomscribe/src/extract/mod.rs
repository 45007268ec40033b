//! Text extraction
//!
//! Pure functions mapping chat messages and generated scripts to structured
//! fields. Nothing here performs I/O.

pub mod chat;
pub mod script;

pub use chat::{
    extract_company_basic_info, extract_section_body, extract_titles, strip_html,
    CompanyBasicInfo, Titles,
};
pub use script::{split_script_by_sections, ScriptSection, ScriptSections};
