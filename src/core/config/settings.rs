use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_concurrency, parse_environment,
    parse_queue_backend, parse_u16, parse_u32, parse_u64,
};
use super::types::{
    AiSettings, ApiSettings, ConfigError, DatabaseSettings, EnrichmentSettings, QueueSettings,
    RedisSettings, RuntimeSettings, S3Settings, ServerHost, ServerPort, ServerSettings, Settings,
    SpeechServiceSettings, StorageSettings, SubmissionSettings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("EXAM_HOST", "0.0.0.0");
        let port = env_or_default("EXAM_PORT", "8000");

        let environment =
            parse_environment(env_optional("EXAM_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("EXAM_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Exam Pipeline API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "exam");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "exam_pipeline");
        let database_url = env_optional("DATABASE_URL");
        let max_connections =
            parse_u32("DB_MAX_CONNECTIONS", env_or_default("DB_MAX_CONNECTIONS", "20"))?;

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let queue_backend = parse_queue_backend(env_or_default("QUEUE_BACKEND", "redis"))?;
        let queue_key_prefix = env_or_default("QUEUE_KEY_PREFIX", "exam-jobs");
        let poll_interval_ms =
            parse_u64("QUEUE_POLL_INTERVAL_MS", env_or_default("QUEUE_POLL_INTERVAL_MS", "1000"))?;
        let stalled_after_seconds = parse_u64(
            "QUEUE_STALLED_AFTER_SECONDS",
            env_or_default("QUEUE_STALLED_AFTER_SECONDS", "900"),
        )?;
        let embedded_workers =
            env_optional("EMBEDDED_WORKERS").map(|value| parse_bool(&value)).unwrap_or(false);
        let enrichment_concurrency = parse_concurrency(
            "ENRICHMENT_CONCURRENCY",
            env_or_default("ENRICHMENT_CONCURRENCY", "1"),
        )?;
        let transcription_concurrency = parse_concurrency(
            "TRANSCRIPTION_CONCURRENCY",
            env_or_default("TRANSCRIPTION_CONCURRENCY", "3"),
        )?;
        let evaluation_concurrency = parse_concurrency(
            "EVALUATION_CONCURRENCY",
            env_or_default("EVALUATION_CONCURRENCY", "3"),
        )?;

        let stagger_ms =
            parse_u64("ENRICHMENT_STAGGER_MS", env_or_default("ENRICHMENT_STAGGER_MS", "30000"))?;
        let enrichment_max_attempts =
            parse_u32("ENRICHMENT_MAX_ATTEMPTS", env_or_default("ENRICHMENT_MAX_ATTEMPTS", "3"))?;
        let enrichment_backoff_ms =
            parse_u64("ENRICHMENT_BACKOFF_MS", env_or_default("ENRICHMENT_BACKOFF_MS", "20000"))?;
        let rubric_enabled = env_optional("RUBRIC_GENERATION_ENABLED")
            .map(|value| parse_bool(&value))
            .unwrap_or(false);
        let tts_language = env_or_default("TTS_LANGUAGE", "en");

        let transcription_delay_ms =
            parse_u64("TRANSCRIPTION_DELAY_MS", env_or_default("TRANSCRIPTION_DELAY_MS", "10000"))?;
        let evaluation_delay_ms =
            parse_u64("EVALUATION_DELAY_MS", env_or_default("EVALUATION_DELAY_MS", "0"))?;
        let submission_max_attempts =
            parse_u32("SUBMISSION_MAX_ATTEMPTS", env_or_default("SUBMISSION_MAX_ATTEMPTS", "3"))?;
        let submission_backoff_ms =
            parse_u64("SUBMISSION_BACKOFF_MS", env_or_default("SUBMISSION_BACKOFF_MS", "2000"))?;
        let expiry_sweep_seconds = parse_u64(
            "ATTEMPT_EXPIRY_SWEEP_SECONDS",
            env_or_default("ATTEMPT_EXPIRY_SWEEP_SECONDS", "0"),
        )?;

        let tts_base_url = env_or_default("TTS_BASE_URL", "");
        let tts_timeout =
            parse_u64("TTS_TIMEOUT_SECONDS", env_or_default("TTS_TIMEOUT_SECONDS", "30"))?;
        let stt_base_url = env_or_default("STT_BASE_URL", "");
        let stt_timeout =
            parse_u64("STT_TIMEOUT_SECONDS", env_or_default("STT_TIMEOUT_SECONDS", "60"))?;

        let openai_api_key = env_or_default("OPENAI_API_KEY", "");
        let openai_base_url = env_or_default("OPENAI_BASE_URL", "https://api.openai.com/v1");
        let ai_model = env_or_default("AI_MODEL", "gpt-4o-mini");
        let ai_max_tokens = parse_u32("AI_MAX_TOKENS", env_or_default("AI_MAX_TOKENS", "1024"))?;
        let ai_request_timeout =
            parse_u64("AI_REQUEST_TIMEOUT", env_or_default("AI_REQUEST_TIMEOUT", "60"))?;

        let local_audio_dir = env_or_default("LOCAL_AUDIO_DIR", "uploads");
        let max_audio_upload_mb =
            parse_u64("MAX_AUDIO_UPLOAD_MB", env_or_default("MAX_AUDIO_UPLOAD_MB", "20"))?;

        let s3_endpoint = env_or_default("S3_ENDPOINT", "");
        let s3_access_key = env_or_default("S3_ACCESS_KEY", "");
        let s3_secret_key = env_or_default("S3_SECRET_KEY", "");
        let s3_bucket = env_or_default("S3_BUCKET", "exam-audio");
        let s3_region = env_or_default("S3_REGION", "us-east-1");

        let log_level = env_or_default("EXAM_LOG_LEVEL", "info");
        let json = env_optional("EXAM_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            queue: QueueSettings {
                backend: queue_backend,
                key_prefix: queue_key_prefix,
                poll_interval_ms,
                stalled_after_seconds,
                embedded_workers,
                enrichment_concurrency,
                transcription_concurrency,
                evaluation_concurrency,
            },
            enrichment: EnrichmentSettings {
                stagger_ms,
                max_attempts: enrichment_max_attempts,
                backoff_base_ms: enrichment_backoff_ms,
                rubric_enabled,
                tts_language,
            },
            submission: SubmissionSettings {
                transcription_delay_ms,
                evaluation_delay_ms,
                max_attempts: submission_max_attempts,
                backoff_base_ms: submission_backoff_ms,
                expiry_sweep_seconds,
            },
            tts: SpeechServiceSettings { base_url: tts_base_url, timeout_seconds: tts_timeout },
            stt: SpeechServiceSettings { base_url: stt_base_url, timeout_seconds: stt_timeout },
            ai: AiSettings {
                openai_api_key,
                openai_base_url,
                ai_model,
                ai_max_tokens,
                ai_request_timeout,
            },
            storage: StorageSettings { local_audio_dir, max_audio_upload_mb },
            s3: S3Settings {
                endpoint: s3_endpoint,
                access_key: s3_access_key,
                secret_key: s3_secret_key,
                bucket: s3_bucket,
                region: s3_region,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn queue(&self) -> &QueueSettings {
        &self.queue
    }

    pub(crate) fn enrichment(&self) -> &EnrichmentSettings {
        &self.enrichment
    }

    pub(crate) fn submission(&self) -> &SubmissionSettings {
        &self.submission
    }

    pub(crate) fn tts(&self) -> &SpeechServiceSettings {
        &self.tts
    }

    pub(crate) fn stt(&self) -> &SpeechServiceSettings {
        &self.stt
    }

    pub(crate) fn ai(&self) -> &AiSettings {
        &self.ai
    }

    pub(crate) fn storage(&self) -> &StorageSettings {
        &self.storage
    }

    pub(crate) fn s3(&self) -> &S3Settings {
        &self.s3
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.enrichment.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ENRICHMENT_MAX_ATTEMPTS",
                value: String::from("0"),
            });
        }
        if self.submission.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SUBMISSION_MAX_ATTEMPTS",
                value: String::from("0"),
            });
        }
        if self.queue.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "QUEUE_POLL_INTERVAL_MS",
                value: String::from("0"),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        if self.ai.openai_api_key.is_empty() {
            return Err(ConfigError::MissingSecret("OPENAI_API_KEY"));
        }

        if self.tts.base_url.is_empty() {
            return Err(ConfigError::MissingSecret("TTS_BASE_URL"));
        }

        if self.stt.base_url.is_empty() {
            return Err(ConfigError::MissingSecret("STT_BASE_URL"));
        }

        Ok(())
    }
}
