//! Tool-using generation agents
//!
//! [`run_agent`] drives the bounded step loop, [`CmsTools`] is the registry
//! of page tools and [`ToolTrace`] records the calls for the run report.

mod orchestrator;
mod tools;
mod trace;

pub use orchestrator::{run_agent, AgentRun};
pub use tools::{page_json, tool_specs, CmsTools, ToolRegistry, CREATE_PAGE, GET_LOCALES, PAGES};
pub use trace::{format_call, truncate_arguments, ToolTrace, DONE_MARKER, MAX_ARGUMENT_CHARS};
