use std::sync::{Arc, Mutex};

use tx_manager::config::AppConfig;
use tx_manager::contract::{
    ConverterResult, InvokeResponse, MockInvoker, MockJobStore, MockModuleStore, MockUserClient,
    User,
};
use tx_manager::manager::{JobRequest, ManagerError, TxManager};
use tx_manager::models::{JobStatus, TxJob, TxModule};

fn test_config() -> AppConfig {
    AppConfig {
        api_url: "https://api.door43.org".to_string(),
        cdn_bucket: "cdn.door43.org".to_string(),
        door43_bucket: "door43.org".to_string(),
        gogs_url: "https://git.door43.org".to_string(),
        prefix: String::new(),
    }
}

fn usfm2html_module() -> TxModule {
    TxModule {
        name: "usfm2html".to_string(),
        module_type: "conversion".to_string(),
        input_format: vec!["usfm".to_string()],
        output_format: vec!["html".to_string()],
        resource_types: vec!["ulb".to_string(), "udb".to_string(), "bible".to_string()],
        ..TxModule::default()
    }
}

fn job_request() -> JobRequest {
    JobRequest {
        user_token: "token123".to_string(),
        resource_type: "ulb".to_string(),
        input_format: "usfm".to_string(),
        output_format: "html".to_string(),
        source: "https://cdn.example.com/preconvert/abc123.zip".to_string(),
        ..JobRequest::default()
    }
}

fn known_user() -> User {
    User {
        username: "tester".to_string(),
        email: "tester@example.com".to_string(),
    }
}

fn mock_users(user: Option<User>) -> MockUserClient {
    let mut users = MockUserClient::new();
    users.expect_get_user().returning(move |_| Ok(user.clone()));
    users
}

fn mock_modules(modules: Vec<TxModule>) -> MockModuleStore {
    let mut store = MockModuleStore::new();
    store.expect_list().returning(move || Ok(modules.clone()));
    store
}

/// A job store whose state survives across calls, so the lifecycle reads its
/// own writes the way the real table does.
fn stateful_job_store(initial: Option<TxJob>) -> (MockJobStore, Arc<Mutex<Option<TxJob>>>) {
    let stored = Arc::new(Mutex::new(initial));
    let mut jobs = MockJobStore::new();
    {
        let stored = stored.clone();
        jobs.expect_get()
            .returning(move |_| Ok(stored.lock().unwrap().clone()));
    }
    {
        let stored = stored.clone();
        jobs.expect_insert().returning(move |job| {
            *stored.lock().unwrap() = Some(job.clone());
            Ok(())
        });
    }
    {
        let stored = stored.clone();
        jobs.expect_update().returning(move |job, _| {
            *stored.lock().unwrap() = Some(job.clone());
            Ok(())
        });
    }
    (jobs, stored)
}

#[tokio::test]
async fn test_setup_job_creates_requested_record() {
    let config = test_config();
    let (jobs, stored) = stateful_job_store(None);
    let modules = mock_modules(vec![usfm2html_module()]);
    let users = mock_users(Some(known_user()));
    let invoker = MockInvoker::new();
    let manager = TxManager::new(&config, &jobs, &modules, &users, &invoker);

    let creation = manager.setup_job(job_request()).await.unwrap();

    let job = &creation.job;
    assert_eq!(job.status, JobStatus::Requested);
    assert_eq!(job.message, "Conversion requested...");
    assert_eq!(job.user, "tester");
    assert_eq!(job.convert_module, "usfm2html");
    // job_id is a sha256 hex digest.
    assert_eq!(job.job_id.len(), 64);
    assert!(job.job_id.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(job.cdn_bucket, "cdn.door43.org");
    assert_eq!(job.cdn_file, format!("tx/job/{}.zip", job.job_id));
    assert_eq!(
        job.output,
        format!("https://cdn.door43.org/tx/job/{}.zip", job.job_id)
    );
    assert!(job.created_at.is_some());
    assert!(job.expires_at.is_some());
    assert!(job.started_at.is_none());
    assert_eq!(creation.links.len(), 2);

    // The record landed in the store.
    assert!(stored.lock().unwrap().is_some());
}

#[tokio::test]
async fn test_setup_job_requires_user_token() {
    let config = test_config();
    let (jobs, _) = stateful_job_store(None);
    let modules = mock_modules(vec![usfm2html_module()]);
    let users = mock_users(Some(known_user()));
    let invoker = MockInvoker::new();
    let manager = TxManager::new(&config, &jobs, &modules, &users, &invoker);

    let mut request = job_request();
    request.user_token = String::new();
    let err = manager.setup_job(request).await.unwrap_err();
    assert_eq!(err.to_string(), "\"user_token\" not given.");
}

#[tokio::test]
async fn test_setup_job_rejects_unknown_token() {
    let config = test_config();
    let (jobs, _) = stateful_job_store(None);
    let modules = mock_modules(vec![usfm2html_module()]);
    let users = mock_users(None);
    let invoker = MockInvoker::new();
    let manager = TxManager::new(&config, &jobs, &modules, &users, &invoker);

    let err = manager.setup_job(job_request()).await.unwrap_err();
    assert!(matches!(err, ManagerError::InvalidUserToken));
}

#[tokio::test]
async fn test_setup_job_requires_source() {
    let config = test_config();
    let (jobs, _) = stateful_job_store(None);
    let modules = mock_modules(vec![usfm2html_module()]);
    let users = mock_users(Some(known_user()));
    let invoker = MockInvoker::new();
    let manager = TxManager::new(&config, &jobs, &modules, &users, &invoker);

    let mut request = job_request();
    request.source = String::new();
    let err = manager.setup_job(request).await.unwrap_err();
    assert_eq!(err.to_string(), "\"source\" not given.");
}

#[tokio::test]
async fn test_setup_job_with_no_matching_converter() {
    let config = test_config();
    let (jobs, _) = stateful_job_store(None);
    let modules = mock_modules(vec![usfm2html_module()]);
    let users = mock_users(Some(known_user()));
    let invoker = MockInvoker::new();
    let manager = TxManager::new(&config, &jobs, &modules, &users, &invoker);

    let mut request = job_request();
    request.input_format = "odt".to_string();
    let err = manager.setup_job(request).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "No converter was found to convert ulb from odt to html"
    );
}

fn requested_job() -> TxJob {
    TxJob {
        job_id: "job1".to_string(),
        user: "tester".to_string(),
        resource_type: "ulb".to_string(),
        input_format: "usfm".to_string(),
        output_format: "html".to_string(),
        source: "https://cdn.example.com/preconvert/abc123.zip".to_string(),
        output: "https://cdn.door43.org/tx/job/job1.zip".to_string(),
        cdn_bucket: "cdn.door43.org".to_string(),
        convert_module: "usfm2html".to_string(),
        status: JobStatus::Requested,
        message: "Conversion requested...".to_string(),
        created_at: Some("2017-04-25T18:00:00Z".to_string()),
        ..TxJob::default()
    }
}

#[tokio::test]
async fn test_start_job_unknown_id_returns_stub() {
    let config = test_config();
    let (jobs, _) = stateful_job_store(None);
    let modules = mock_modules(vec![]);
    let users = mock_users(None);
    let invoker = MockInvoker::new();
    let manager = TxManager::new(&config, &jobs, &modules, &users, &invoker);

    let job = manager.start_job("missing-id").await.unwrap();
    assert_eq!(job.job_id, "missing-id");
    assert!(!job.success);
    assert_eq!(
        job.message,
        "No job with ID missing-id has been requested"
    );
}

#[tokio::test]
async fn test_start_job_success_lifecycle() {
    let config = test_config();
    let (jobs, stored) = stateful_job_store(Some(requested_job()));
    let modules = mock_modules(vec![usfm2html_module()]);
    let users = mock_users(None);
    let mut invoker = MockInvoker::new();
    invoker
        .expect_invoke()
        .withf(|function, payload| {
            function == "tx_convert_usfm2html" && payload["data"]["job"]["job_id"] == "job1"
        })
        .times(1)
        .returning(|_, _| {
            Ok(InvokeResponse::Payload(ConverterResult {
                success: true,
                info: vec!["Converted 1 book".to_string()],
                errors: vec![],
                warnings: vec![],
            }))
        });
    let manager = TxManager::new(&config, &jobs, &modules, &users, &invoker);

    let job = manager.start_job("job1").await.unwrap();

    assert_eq!(job.status, JobStatus::Success);
    assert!(job.success);
    assert_eq!(job.message, "Conversion successful");
    assert!(job.started_at.is_some());
    assert!(job.ended_at.is_some());
    assert!(job.errors.is_empty());
    assert!(job
        .log
        .iter()
        .any(|line| line == "usfm2html function returned successfully."));
    assert!(job.log.iter().any(|line| line == "Converted 1 book"));

    // Terminal state persisted.
    let stored = stored.lock().unwrap().clone().unwrap();
    assert_eq!(stored.status, JobStatus::Success);
}

#[tokio::test]
async fn test_start_job_twice_is_a_noop() {
    let config = test_config();
    let (jobs, _) = stateful_job_store(Some(requested_job()));
    let modules = mock_modules(vec![usfm2html_module()]);
    let users = mock_users(None);
    let mut invoker = MockInvoker::new();
    // The converter runs exactly once across both start calls.
    invoker.expect_invoke().times(1).returning(|_, _| {
        Ok(InvokeResponse::Payload(ConverterResult {
            success: true,
            info: vec![],
            errors: vec![],
            warnings: vec![],
        }))
    });
    let manager = TxManager::new(&config, &jobs, &modules, &users, &invoker);

    let first = manager.start_job("job1").await.unwrap();
    assert_eq!(first.status, JobStatus::Success);

    let second = manager.start_job("job1").await.unwrap();
    assert_eq!(second.status, JobStatus::Success);
    assert_eq!(second.started_at, first.started_at);
    assert_eq!(second.log.len(), first.log.len());
}

#[tokio::test]
async fn test_start_job_error_envelope_fails_job() {
    let config = test_config();
    let (jobs, _) = stateful_job_store(Some(requested_job()));
    let modules = mock_modules(vec![usfm2html_module()]);
    let users = mock_users(None);
    let mut invoker = MockInvoker::new();
    invoker.expect_invoke().returning(|_, _| {
        Ok(InvokeResponse::ErrorEnvelope {
            error_message: "Bad Request: source zip could not be downloaded".to_string(),
        })
    });
    let manager = TxManager::new(&config, &jobs, &modules, &users, &invoker);

    let job = manager.start_job("job1").await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert!(!job.success);
    assert_eq!(job.message, "Conversion failed");
    // The "Bad Request: " prefix is stripped before recording.
    assert_eq!(job.errors, vec!["source zip could not be downloaded"]);
}

#[tokio::test]
async fn test_start_job_warnings_are_a_successful_terminal_state() {
    let config = test_config();
    let (jobs, _) = stateful_job_store(Some(requested_job()));
    let modules = mock_modules(vec![usfm2html_module()]);
    let users = mock_users(None);
    let mut invoker = MockInvoker::new();
    invoker.expect_invoke().returning(|_, _| {
        Ok(InvokeResponse::Payload(ConverterResult {
            success: true,
            info: vec![],
            errors: vec![],
            warnings: vec!["Missing verse 5 in chapter 3".to_string()],
        }))
    });
    let manager = TxManager::new(&config, &jobs, &modules, &users, &invoker);

    let job = manager.start_job("job1").await.unwrap();

    assert_eq!(job.status, JobStatus::Warnings);
    assert!(job.success);
    assert_eq!(job.message, "Conversion successful with warnings");
    assert_eq!(job.warnings, vec!["Missing verse 5 in chapter 3"]);
    assert!(job
        .log
        .iter()
        .any(|line| line == "usfm2html function returned with warnings."));
}

#[tokio::test]
async fn test_start_job_converter_errors_force_failure() {
    let config = test_config();
    let (jobs, _) = stateful_job_store(Some(requested_job()));
    let modules = mock_modules(vec![usfm2html_module()]);
    let users = mock_users(None);
    let mut invoker = MockInvoker::new();
    invoker.expect_invoke().returning(|_, _| {
        Ok(InvokeResponse::Payload(ConverterResult {
            success: true,
            info: vec![],
            errors: vec!["Malformed USFM in 01-GEN.usfm".to_string()],
            warnings: vec![],
        }))
    });
    let manager = TxManager::new(&config, &jobs, &modules, &users, &invoker);

    let job = manager.start_job("job1").await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert!(!job.success);
    assert_eq!(job.errors, vec!["Malformed USFM in 01-GEN.usfm"]);
    assert!(job
        .log
        .iter()
        .any(|line| line == "usfm2html function returned with errors."));
}

#[tokio::test]
async fn test_start_job_invoker_fault_is_captured_not_propagated() {
    let config = test_config();
    let (jobs, stored) = stateful_job_store(Some(requested_job()));
    let modules = mock_modules(vec![usfm2html_module()]);
    let users = mock_users(None);
    let mut invoker = MockInvoker::new();
    invoker
        .expect_invoke()
        .returning(|_, _| Err("connection reset by peer".into()));
    let manager = TxManager::new(&config, &jobs, &modules, &users, &invoker);

    let job = manager.start_job("job1").await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job
        .errors
        .iter()
        .any(|e| e.contains("Failed with message: connection reset by peer")));
    // Never left stuck in 'started'.
    let stored = stored.lock().unwrap().clone().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
}

#[tokio::test]
async fn test_register_module_appends_public_link() {
    let config = test_config();
    let (jobs, _) = stateful_job_store(None);
    let mut module_store = MockModuleStore::new();
    module_store.expect_insert().times(1).returning(|_| Ok(()));
    let users = mock_users(None);
    let invoker = MockInvoker::new();
    let manager = TxManager::new(&config, &jobs, &module_store, &users, &invoker);

    let registered = manager.register_module(usfm2html_module()).await.unwrap();
    assert!(registered
        .public_links
        .contains(&"https://api.door43.org/tx/convert/usfm2html".to_string()));
}

#[tokio::test]
async fn test_register_module_requires_name() {
    let config = test_config();
    let (jobs, _) = stateful_job_store(None);
    let module_store = MockModuleStore::new();
    let users = mock_users(None);
    let invoker = MockInvoker::new();
    let manager = TxManager::new(&config, &jobs, &module_store, &users, &invoker);

    let mut module = usfm2html_module();
    module.name = String::new();
    let err = manager.register_module(module).await.unwrap_err();
    assert_eq!(err.to_string(), "\"name\" not given.");
}

#[tokio::test]
async fn test_list_jobs_scopes_to_authenticated_user() {
    let config = test_config();
    let mut jobs = MockJobStore::new();
    jobs.expect_query()
        .withf(|filter| filter.user.as_deref() == Some("tester"))
        .returning(|_| Ok(vec![requested_job()]));
    let modules = mock_modules(vec![]);
    let users = mock_users(Some(known_user()));
    let invoker = MockInvoker::new();
    let manager = TxManager::new(&config, &jobs, &modules, &users, &invoker);

    let listed = manager.list_jobs(Some("token123"), true).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].job_id, "job1");
}
