use sqlx::Row;

fn database_url() -> Option<String> {
    dotenvy::dotenv().ok();

    std::env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty())
}

#[tokio::test]
async fn migrations_apply_and_tables_exist() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        eprintln!("DATABASE_URL is not set; skipping migrations smoke test");
        return Ok(());
    };

    let pool =
        sqlx::postgres::PgPoolOptions::new().max_connections(1).connect(&database_url).await?;

    let migrations_dir =
        std::env::var("EXAM_MIGRATIONS_DIR").unwrap_or_else(|_| "migrations".to_string());
    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(&migrations_dir)).await?;
    migrator.run(&pool).await?;
    // Applying twice is a no-op.
    migrator.run(&pool).await?;

    for table in ["exams", "questions", "attempts", "answers"] {
        let row = sqlx::query("SELECT to_regclass($1)::text").bind(table).fetch_one(&pool).await?;
        let regclass: Option<String> = row.try_get(0)?;
        assert!(regclass.is_some(), "expected table {table} to exist after migrations");
    }

    for type_name in ["examstatus", "questiontype", "audiostatus", "rubricstatus", "attemptstatus", "stagestatus"] {
        let row = sqlx::query("SELECT count(*) FROM pg_type WHERE typname = $1")
            .bind(type_name)
            .fetch_one(&pool)
            .await?;
        let count: i64 = row.try_get(0)?;
        assert_eq!(count, 1, "expected enum type {type_name} to exist after migrations");
    }

    Ok(())
}
