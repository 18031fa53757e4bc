//! LeadPilot: a small CRM for lead tracking, follow-up tasks and next-action insights.

pub mod auth;
pub mod core;
pub mod crm;
pub mod drive;
pub mod llm;
pub mod main_module;
pub mod security;
pub mod storage;
pub mod tasks;
pub mod ui;
