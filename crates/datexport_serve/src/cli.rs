use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use datexport_xlsx::conf::C_TEMPLATE_FILE_NAME;

/// Route of the reference template download.
pub const C_ROUTE_REPORT_TEMPLATE: &str = "/data-export/getReportTemplate";

#[derive(Parser, Debug, Clone)]
#[command(name = "datexport")]
#[command(about = "Export grid data into styled XLSX workbooks")]
#[command(version)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: EnumCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum EnumCommand {
    /// Serve the reference template workbook over HTTP
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,

        /// Template workbook served for downloads
        #[arg(long, value_name = "PATH", default_value = C_TEMPLATE_FILE_NAME)]
        file_template: PathBuf,

        /// Route of the download endpoint; must start with `/`
        #[arg(long, default_value = C_ROUTE_REPORT_TEMPLATE, value_parser = parse_route)]
        route: String,
    },

    /// Render the reference template workbook
    Template {
        /// Output workbook
        #[arg(long, short = 'o', value_name = "PATH", default_value = C_TEMPLATE_FILE_NAME)]
        out: PathBuf,

        /// Template styling JSON; built-in styling when omitted
        #[arg(long, value_name = "PATH")]
        template_json: Option<PathBuf>,
    },

    /// Export records described by a job file
    Export {
        /// Export job JSON
        #[arg(long, value_name = "PATH")]
        job: PathBuf,

        /// Records: `.json` array, or Arrow IPC (`.arrow`, `.ipc`, `.feather`)
        #[arg(long, value_name = "PATH")]
        records: PathBuf,

        /// Directory receiving the workbook
        #[arg(long, value_name = "DIR", default_value = ".")]
        out_dir: PathBuf,

        /// Export date shown in the filter summary (YYYY-MM-DD); today by default
        #[arg(long, value_name = "DATE")]
        date: Option<NaiveDate>,
    },
}

impl CliArgs {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Accept absolute route paths only.
pub fn parse_route(value: &str) -> Result<String, String> {
    if value.starts_with('/') {
        Ok(value.to_string())
    } else {
        Err(format!("route must start with '/': {value:?}"))
    }
}
