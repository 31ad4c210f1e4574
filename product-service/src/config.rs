use clap::Args;

/// Store connection settings. `DATABASE_URL` wins over the individual parts.
#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "DB_HOST", default_value = "db")]
    pub db_host: String,

    #[arg(long, env = "DB_USER", default_value = "myuser")]
    pub db_user: String,

    #[arg(long, env = "DB_PASSWORD", default_value = "mypassword", hide_env_values = true)]
    pub db_password: String,

    #[arg(long, env = "DB_NAME", default_value = "ecommerce")]
    pub db_name: String,
}

impl StoreArgs {
    pub fn database_url(&self) -> String {
        match &self.database_url {
            Some(url) => url.clone(),
            None => format!(
                "postgres://{}:{}@{}/{}",
                self.db_user, self.db_password, self.db_host, self.db_name
            ),
        }
    }
}
