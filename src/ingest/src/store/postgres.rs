use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::Context;
use inventory_common::{
    AppServerConfiguration, AppServerInstance, InstanceKind, JarHashSet, JvmInstance, NewInstance,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{debug, info};

use super::{InstanceRow, InstanceStore, StoreCounts, StoreTransaction, StoredInstance};
use crate::config::Config;
use crate::constants::BIND_LIMIT;
use crate::error::PersistenceError;

/// Postgres-backed store. Schema lives in the workspace `migrations/` directory.
#[derive(Debug, Clone)]
pub struct PgInstanceStore {
    pool: PgPool,
}

pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PgInstanceStore {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await
            .context("failed to connect to the inventory database")?;

        info!(
            max_connections = config.database_max_connections,
            "Connected to inventory database"
        );
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .context("failed to run migrations")?;
        info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// closes the connection pool
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Successfully closed connection pool");
    }
}

fn map_unique(err: sqlx::Error, linking_hash: &str) -> PersistenceError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return PersistenceError::UniqueViolation {
                linking_hash: linking_hash.to_string(),
            };
        }
    }
    PersistenceError::Database(err)
}

/// Upserts jar hash values and returns their ids keyed by hash. Existing rows keep their name
/// and version unless those were never recorded.
async fn upsert_jar_hashes(
    conn: &mut PgConnection,
    jar_hashes: &JarHashSet,
) -> Result<HashMap<String, i64>, PersistenceError> {
    const PARAMS: usize = 3;

    let jars: Vec<_> = jar_hashes.iter().collect();
    let mut ids = HashMap::with_capacity(jars.len());

    for chunk in jars.chunks(BIND_LIMIT / PARAMS) {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO jar_hash (hash, name, version) ");
        builder.push_values(chunk, |mut b, jar| {
            b.push_bind(jar.hash.clone())
                .push_bind(jar.name.clone())
                .push_bind(jar.version.clone());
        });
        builder.push(
            " ON CONFLICT (hash) DO UPDATE SET \
             name = COALESCE(jar_hash.name, EXCLUDED.name), \
             version = COALESCE(jar_hash.version, EXCLUDED.version) \
             RETURNING id, hash",
        );

        let rows: Vec<(i64, String)> = builder.build_query_as().fetch_all(&mut *conn).await?;
        ids.extend(rows.into_iter().map(|(id, hash)| (hash, id)));
    }

    Ok(ids)
}

fn jar_ids(
    ids: &HashMap<String, i64>,
    jar_hashes: &JarHashSet,
) -> Result<Vec<i64>, PersistenceError> {
    jar_hashes
        .iter()
        .map(|jar| {
            ids.get(&jar.hash).copied().ok_or_else(|| {
                PersistenceError::Inconsistent(format!("jar hash {} was not upserted", jar.hash))
            })
        })
        .collect()
}

/// Links jar hash rows to one owner row; existing links are left alone. Returns how many links
/// were added.
async fn link_jar_hashes(
    conn: &mut PgConnection,
    table: &str,
    owner_column: &str,
    owner_id: i64,
    jar_ids: &[i64],
) -> Result<u64, PersistenceError> {
    const PARAMS: usize = 2;

    let mut added = 0;
    for chunk in jar_ids.chunks(BIND_LIMIT / PARAMS) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} ({}, jar_hash_id) ",
            table, owner_column
        ));
        builder.push_values(chunk, |mut b, jar_id| {
            b.push_bind(owner_id).push_bind(*jar_id);
        });
        builder.push(" ON CONFLICT DO NOTHING");
        added += builder.build().execute(&mut *conn).await?.rows_affected();
    }

    Ok(added)
}

async fn insert_jvm_row(
    conn: &mut PgConnection,
    kind: InstanceKind,
    jvm: &JvmInstance,
) -> Result<i64, PersistenceError> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO runtime_instance (\
            linking_hash, kind, account_id, org_id, created, hostname, launch_time, vendor, \
            version_string, version, heap_min, heap_max, processors, java_home, java_class_path, \
            pid, details\
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
         RETURNING id",
    )
    .bind(&jvm.linking_hash)
    .bind(kind.as_str())
    .bind(&jvm.account_id)
    .bind(&jvm.org_id)
    .bind(jvm.created)
    .bind(&jvm.hostname)
    .bind(jvm.launch_time)
    .bind(&jvm.vendor)
    .bind(&jvm.version_string)
    .bind(&jvm.version)
    .bind(jvm.heap_min)
    .bind(jvm.heap_max)
    .bind(jvm.processors)
    .bind(&jvm.java_home)
    .bind(&jvm.java_class_path)
    .bind(jvm.pid)
    .bind(&jvm.details)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_unique(e, &jvm.linking_hash))?;

    Ok(id)
}

async fn insert_app_server_rows(
    conn: &mut PgConnection,
    instance_id: i64,
    app: &AppServerInstance,
    ids: &HashMap<String, i64>,
) -> Result<(), PersistenceError> {
    sqlx::query(
        "INSERT INTO app_server_instance \
         (instance_id, server_version, xp, yaml_extension, bootable_jar, use_git, raw) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(instance_id)
    .bind(&app.server_version)
    .bind(app.xp)
    .bind(app.yaml_extension)
    .bind(app.bootable_jar)
    .bind(app.use_git)
    .bind(&app.raw)
    .execute(&mut *conn)
    .await?;

    let module_ids = jar_ids(ids, &app.module_jar_hashes)?;
    link_jar_hashes(
        conn,
        "app_server_module_jar_hash",
        "instance_id",
        instance_id,
        &module_ids,
    )
    .await?;

    if let Some(config) = &app.configuration {
        insert_configuration(conn, instance_id, config, ids).await?;
    }

    Ok(())
}

async fn insert_configuration(
    conn: &mut PgConnection,
    instance_id: i64,
    config: &AppServerConfiguration,
    ids: &HashMap<String, i64>,
) -> Result<(), PersistenceError> {
    let (configuration_id,): (i64,) = sqlx::query_as(
        "INSERT INTO app_server_configuration (\
            instance_id, version, launch_type, name, organization, process_type, product_name, \
            product_version, profile_name, release_codename, release_version, running_mode, \
            runtime_configuration_state, server_state, suspend_state, socket_binding_groups, \
            paths, interfaces\
         ) VALUES (\
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18\
         ) \
         RETURNING id",
    )
    .bind(instance_id)
    .bind(&config.version)
    .bind(&config.launch_type)
    .bind(&config.name)
    .bind(&config.organization)
    .bind(&config.process_type)
    .bind(&config.product_name)
    .bind(&config.product_version)
    .bind(&config.profile_name)
    .bind(&config.release_codename)
    .bind(&config.release_version)
    .bind(&config.running_mode)
    .bind(&config.runtime_configuration_state)
    .bind(&config.server_state)
    .bind(&config.suspend_state)
    .bind(&config.socket_binding_groups)
    .bind(&config.paths)
    .bind(&config.interfaces)
    .fetch_one(&mut *conn)
    .await?;

    for deployment in &config.deployments {
        let (deployment_id,): (i64,) = sqlx::query_as(
            "INSERT INTO app_server_deployment \
             (configuration_id, name, runtime_name, enabled, persistent, content) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(configuration_id)
        .bind(&deployment.name)
        .bind(&deployment.runtime_name)
        .bind(deployment.enabled)
        .bind(deployment.persistent)
        .bind(&deployment.content)
        .fetch_one(&mut *conn)
        .await?;

        let archive_ids = jar_ids(ids, &deployment.archive_jar_hashes)?;
        link_jar_hashes(
            conn,
            "app_server_deployment_jar_hash",
            "deployment_id",
            deployment_id,
            &archive_ids,
        )
        .await?;
    }

    for extension in &config.extensions {
        let (extension_id,): (i64,) = sqlx::query_as(
            "INSERT INTO app_server_extension (configuration_id, module) VALUES ($1, $2) \
             RETURNING id",
        )
        .bind(configuration_id)
        .bind(&extension.module)
        .fetch_one(&mut *conn)
        .await?;

        if extension.subsystems.is_empty() {
            continue;
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO app_server_extension_subsystem (extension_id, name, \
             management_major_version, management_minor_version, management_micro_version) ",
        );
        builder.push_values(&extension.subsystems, |mut b, subsystem| {
            b.push_bind(extension_id)
                .push_bind(subsystem.name.clone())
                .push_bind(subsystem.management_major_version)
                .push_bind(subsystem.management_minor_version)
                .push_bind(subsystem.management_micro_version);
        });
        builder.build().execute(&mut *conn).await?;
    }

    if !config.subsystems.is_empty() {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO app_server_configuration_subsystem (configuration_id, name, settings) ",
        );
        builder.push_values(&config.subsystems, |mut b, (name, settings)| {
            b.push_bind(configuration_id)
                .push_bind(name.clone())
                .push_bind(settings.clone());
        });
        builder.build().execute(&mut *conn).await?;
    }

    Ok(())
}

async fn hash_set(
    conn: &mut PgConnection,
    sql: &str,
    owner_id: i64,
) -> Result<BTreeSet<String>, PersistenceError> {
    let rows: Vec<(String,)> = sqlx::query_as(sql)
        .bind(owner_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().map(|(hash,)| hash).collect())
}

fn parse_kind(kind: &str) -> Result<InstanceKind, PersistenceError> {
    InstanceKind::parse(kind)
        .ok_or_else(|| PersistenceError::Inconsistent(format!("unknown instance kind {}", kind)))
}

type InstanceSummary = (
    i64,
    String,
    String,
    String,
    Option<String>,
    chrono::DateTime<chrono::Utc>,
    String,
    i64,
    Option<String>,
);

impl InstanceStore for PgInstanceStore {
    type Transaction = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction, PersistenceError> {
        Ok(PgTransaction {
            tx: self.pool.begin().await?,
        })
    }

    async fn find_instance(
        &self,
        linking_hash: &str,
    ) -> Result<Option<StoredInstance>, PersistenceError> {
        let mut conn = self.pool.acquire().await?;

        let row: Option<InstanceSummary> = sqlx::query_as(
            "SELECT ri.id, ri.kind, ri.linking_hash, ri.org_id, ri.account_id, ri.created, \
                    ri.hostname, ri.launch_time, asi.server_version \
             FROM runtime_instance ri \
             LEFT JOIN app_server_instance asi ON asi.instance_id = ri.id \
             WHERE ri.linking_hash = $1",
        )
        .bind(linking_hash)
        .fetch_optional(&mut *conn)
        .await?;

        let Some((
            id,
            kind,
            linking_hash,
            org_id,
            account_id,
            created,
            hostname,
            launch_time,
            server_version,
        )) = row
        else {
            return Ok(None);
        };

        let jar_hashes = hash_set(
            &mut conn,
            "SELECT jh.hash FROM instance_jar_hash l \
             JOIN jar_hash jh ON jh.id = l.jar_hash_id WHERE l.instance_id = $1",
            id,
        )
        .await?;
        let module_jar_hashes = hash_set(
            &mut conn,
            "SELECT jh.hash FROM app_server_module_jar_hash l \
             JOIN jar_hash jh ON jh.id = l.jar_hash_id WHERE l.instance_id = $1",
            id,
        )
        .await?;

        let deployment_rows: Vec<(String, Option<String>)> = sqlx::query_as(
            "SELECT d.name, jh.hash \
             FROM app_server_configuration c \
             JOIN app_server_deployment d ON d.configuration_id = c.id \
             LEFT JOIN app_server_deployment_jar_hash l ON l.deployment_id = d.id \
             LEFT JOIN jar_hash jh ON jh.id = l.jar_hash_id \
             WHERE c.instance_id = $1",
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

        let mut deployment_jar_hashes: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (name, hash) in deployment_rows {
            let hashes = deployment_jar_hashes.entry(name).or_default();
            if let Some(hash) = hash {
                hashes.insert(hash);
            }
        }

        Ok(Some(StoredInstance {
            id,
            kind: parse_kind(&kind)?,
            linking_hash,
            org_id,
            account_id,
            created,
            hostname,
            launch_time,
            server_version,
            jar_hashes,
            module_jar_hashes,
            deployment_jar_hashes,
        }))
    }

    async fn delete_instance(&self, linking_hash: &str) -> Result<bool, PersistenceError> {
        let result = sqlx::query("DELETE FROM runtime_instance WHERE linking_hash = $1")
            .bind(linking_hash)
            .execute(&self.pool)
            .await?;

        debug!(linking_hash, rows = result.rows_affected(), "deleted instance");
        Ok(result.rows_affected() > 0)
    }

    async fn counts(&self) -> Result<StoreCounts, PersistenceError> {
        let row: (i64, i64, i64, i64, i64, i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            "SELECT \
                (SELECT COUNT(*) FROM runtime_instance), \
                (SELECT COUNT(*) FROM app_server_instance), \
                (SELECT COUNT(*) FROM app_server_configuration), \
                (SELECT COUNT(*) FROM app_server_deployment), \
                (SELECT COUNT(*) FROM app_server_extension), \
                (SELECT COUNT(*) FROM app_server_extension_subsystem), \
                (SELECT COUNT(*) FROM app_server_configuration_subsystem), \
                (SELECT COUNT(*) FROM jar_hash), \
                (SELECT COUNT(*) FROM instance_jar_hash), \
                (SELECT COUNT(*) FROM app_server_module_jar_hash), \
                (SELECT COUNT(*) FROM app_server_deployment_jar_hash)",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreCounts {
            instances: row.0,
            app_server_instances: row.1,
            configurations: row.2,
            deployments: row.3,
            extensions: row.4,
            extension_subsystems: row.5,
            configuration_subsystems: row.6,
            jar_hashes: row.7,
            instance_jar_hashes: row.8,
            module_jar_hashes: row.9,
            deployment_jar_hashes: row.10,
        })
    }
}

impl StoreTransaction for PgTransaction {
    async fn insert_instance(&mut self, instance: &NewInstance) -> Result<i64, PersistenceError> {
        let conn: &mut PgConnection = &mut self.tx;
        let jvm = instance.jvm();

        let instance_id = insert_jvm_row(conn, instance.kind(), jvm).await?;

        // One upsert for every position so a hash shared between positions maps to one row.
        let all_jars = match instance {
            NewInstance::Jvm(jvm) => jvm.jar_hashes.clone(),
            NewInstance::AppServer(app) => app.all_jar_hashes(),
        };
        let ids = upsert_jar_hashes(conn, &all_jars).await?;

        let direct_ids = jar_ids(&ids, &jvm.jar_hashes)?;
        link_jar_hashes(conn, "instance_jar_hash", "instance_id", instance_id, &direct_ids)
            .await?;

        if let NewInstance::AppServer(app) = instance {
            insert_app_server_rows(conn, instance_id, app, &ids).await?;
        }

        debug!(
            instance_id,
            linking_hash = %jvm.linking_hash,
            jar_hashes = all_jars.len(),
            "inserted instance graph"
        );
        Ok(instance_id)
    }

    async fn instances_by_linking_hash(
        &mut self,
        linking_hash: &str,
    ) -> Result<Vec<InstanceRow>, PersistenceError> {
        let rows: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT id, linking_hash, kind FROM runtime_instance \
             WHERE linking_hash = $1 FOR UPDATE",
        )
        .bind(linking_hash)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter()
            .map(|(id, linking_hash, kind)| {
                Ok(InstanceRow {
                    id,
                    linking_hash,
                    kind: parse_kind(&kind)?,
                })
            })
            .collect()
    }

    async fn add_instance_jar_hashes(
        &mut self,
        instance_id: i64,
        jar_hashes: &JarHashSet,
    ) -> Result<u64, PersistenceError> {
        let conn: &mut PgConnection = &mut self.tx;

        let ids = upsert_jar_hashes(conn, jar_hashes).await?;
        let jar_ids = jar_ids(&ids, jar_hashes)?;
        link_jar_hashes(conn, "instance_jar_hash", "instance_id", instance_id, &jar_ids).await
    }

    async fn commit(self) -> Result<(), PersistenceError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), PersistenceError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
