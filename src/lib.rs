//! scholar-wizard - progressive scholarship recommendation wizard
//!
//! A multi-step questionnaire that builds a student profile step by step, submits each
//! step to a remote scoring service, shows the narrowing result between steps and
//! survives restarts, back navigation and network failures without losing or
//! duplicating progress.

pub mod api;
pub mod config;
pub mod logging;
pub mod profile;
pub mod rest;
pub mod state;
pub mod steps;
pub mod wizard;

pub use config::Config;
pub use wizard::{Transition, Wizard, WizardError, WizardHandle};
