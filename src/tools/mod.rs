//! Bundled tools the agent can call:
//! - `browserService`: web search and scrape
//! - `terminalService`: container-isolated commands
//! - `reportService`: doc/pdf/txt report files

pub mod browser;
pub mod report;
pub mod terminal;

pub use browser::{browser_toolkit, BrowserConfig, BrowserTool, PageSummary, SearchHit, BROWSER_TOOL};
pub use report::{report_toolkit, ReportFormat, ReportTool, REPORT_TOOL};
pub use terminal::{terminal_toolkit, TerminalConfig, TerminalTool, BLOCKED_COMMANDS, TERMINAL_TOOL};

use crate::config::ToolsConfig;
use crate::error::Result;
use crate::tool::ToolRegistry;

/// Registry with all three bundled tools configured from `cfg`.
pub fn default_toolkit(cfg: &ToolsConfig) -> Result<ToolRegistry> {
    let mut registry = browser_toolkit(BrowserConfig {
        default_results: cfg.browser_max_results,
        timeout_secs: cfg.browser_timeout_secs,
        ..BrowserConfig::default()
    })?;
    registry.merge(terminal_toolkit(
        TerminalConfig::container(&cfg.terminal_runner, &cfg.terminal_image)
            .with_timeout(cfg.terminal_timeout_secs),
    ));
    registry.merge(report_toolkit(&cfg.report_dir));
    tracing::info!(tools = ?registry.names(), "registered bundled tools");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_all_bundled_tools() {
        let registry = default_toolkit(&ToolsConfig::default()).unwrap();
        assert_eq!(
            registry.names(),
            vec![BROWSER_TOOL, REPORT_TOOL, TERMINAL_TOOL]
        );
    }
}
