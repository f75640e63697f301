use chat_backend::config::database_url_from_env;
use sqlx::postgres::PgPool;

const EXPECTED_TABLES: [&str; 4] = ["users", "chat_messages", "user_sessions", "file_uploads"];

#[tokio::main]
async fn main() -> Result<(), sqlx::Error> {
    dotenvy::dotenv().ok();

    println!("Connecting to database...");
    let pool = PgPool::connect(&database_url_from_env()).await?;

    let tables: Vec<(String,)> =
        sqlx::query_as("SELECT tablename::text FROM pg_tables WHERE schemaname = 'public'")
            .fetch_all(&pool)
            .await?;
    let present: Vec<&str> = tables.iter().map(|(name,)| name.as_str()).collect();

    let mut missing = 0;
    for table in EXPECTED_TABLES {
        if present.contains(&table) {
            println!("OK       {}", table);
        } else {
            println!("MISSING  {}", table);
            missing += 1;
        }
    }

    println!("\nApplied migrations:");
    let migrations = sqlx::query_as::<_, (i64, String, bool)>(
        "SELECT version, description, success FROM _sqlx_migrations ORDER BY version DESC",
    )
    .fetch_all(&pool)
    .await;

    match migrations {
        Ok(migrations) => {
            for (version, description, success) in migrations {
                println!("  - {} {} (success: {})", version, description, success);
            }
        }
        Err(e) => println!("  could not read _sqlx_migrations: {}", e),
    }

    if missing > 0 {
        eprintln!("\n{} expected table(s) missing; run the server once to apply migrations", missing);
        std::process::exit(1);
    }

    Ok(())
}
