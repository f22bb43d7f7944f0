//! Shared building blocks of the account brief pipeline: payload
//! normalization, fact extraction and KPI derivation, brief and digest
//! generation, the collaborator adapters and the stage entry points used by
//! the services.

pub mod blob;
pub mod brief;
pub mod config;
pub mod dto;
pub mod edgar;
pub mod error;
pub mod facts;
pub mod http;
pub mod intel;
pub mod kpi;
pub mod mailer;
pub mod openai_client;
pub mod payload;
pub mod stages;
