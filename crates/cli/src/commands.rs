use clap::{Args, Subcommand};

#[derive(Subcommand)]
pub enum Commands {
    /// Compile the root level of a request and print SQL, parameters and
    /// alias mapping without touching a store
    Plan {
        #[arg(long, help = "Request file (JSON)")]
        request: String,

        #[arg(long, default_value = "postgres", help = "SQL dialect: postgres or mysql")]
        dialect: String,

        #[command(flatten)]
        caller: CallerArgs,
    },
    /// Execute a request and print the nested result
    Query {
        #[arg(long, help = "Request file (JSON)")]
        request: String,

        #[arg(long, help = "Connection URL (postgres:// or mysql://)", conflicts_with = "fixture")]
        url: Option<String>,

        #[arg(long, help = "JSON fixture served from memory instead of a database")]
        fixture: Option<String>,

        #[arg(long, default_value = "main", help = "Store name the source is registered under")]
        store: String,

        #[arg(long, help = "Engine settings file (JSON)")]
        config: Option<String>,

        #[arg(long, help = "Also print the root alias mapping")]
        mapping: bool,

        #[arg(long, help = "Write the result to this file instead of stdout")]
        output: Option<String>,

        #[command(flatten)]
        caller: CallerArgs,
    },
}

/// Who the request runs as. Without a policy file every caller is an
/// administrator.
#[derive(Args, Debug, Clone)]
pub struct CallerArgs {
    #[arg(long, help = "Role policies file (JSON)")]
    pub policy: Option<String>,

    #[arg(long, requires = "policy", help = "Role to evaluate the policy for")]
    pub role: Option<String>,

    #[arg(long, help = "User identifier recorded with the request")]
    pub user: Option<String>,
}
