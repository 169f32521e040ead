//! In-memory [`DirectoryApi`] with scripted failures.
//!
//! Backs engine tests, behind the `testing` feature. Listings are paged with a
//! configurable page size so pagination is exercised too.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::directory::{
    AssignmentPage, AssignmentRecord, CreateOutcome, DeleteOutcome, DirectoryApi, PageToken,
};
use crate::error::DirectoryError;
use crate::types::{
    AppRole, ApplicationId, AssignmentId, PrincipalAssignment, PrincipalKey, PrincipalType,
    RoleId,
};

type MutationHook = Arc<dyn Fn(usize) + Send + Sync>;

#[derive(Debug, Default)]
struct App {
    records: Vec<AssignmentRecord>,
    roles: Vec<AppRole>,
}

#[derive(Default)]
struct State {
    apps: HashMap<ApplicationId, App>,
    list_failures: HashMap<ApplicationId, DirectoryError>,
    create_failures: HashMap<PrincipalKey, VecDeque<DirectoryError>>,
    delete_failures: HashMap<AssignmentId, VecDeque<DirectoryError>>,
    /// Remove the application after this many mutation calls.
    vanish_after: Option<(ApplicationId, usize)>,
    next_id: usize,
}

/// A directory held entirely in memory.
pub struct MemoryDirectory {
    state: Mutex<State>,
    page_size: usize,
    list_calls: AtomicUsize,
    mutation_calls: AtomicUsize,
    on_mutation: Mutex<Option<MutationHook>>,
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::with_page_size(100)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: page_size.max(1),
            list_calls: AtomicUsize::new(0),
            mutation_calls: AtomicUsize::new(0),
            on_mutation: Mutex::new(None),
        }
    }

    /// Register an application with no assignments.
    pub fn add_application(&self, application: &ApplicationId, roles: Vec<AppRole>) {
        self.lock()
            .apps
            .entry(application.clone())
            .or_default()
            .roles = roles;
    }

    /// Seed an assignment; the application is created if missing.
    pub fn seed(&self, application: &ApplicationId, assignment: PrincipalAssignment) {
        self.seed_raw(
            application,
            AssignmentRecord {
                assignment_id: assignment.assignment_id.0,
                principal_id: assignment.principal_id.0,
                principal_type: assignment.principal_type.to_string(),
                role_id: assignment.role_id.0,
            },
        );
    }

    /// Seed a raw record, including principal types the engine skips.
    pub fn seed_raw(&self, application: &ApplicationId, record: AssignmentRecord) {
        self.lock()
            .apps
            .entry(application.clone())
            .or_default()
            .records
            .push(record);
    }

    /// Every listing of `application` fails with `err`.
    pub fn fail_list(&self, application: &ApplicationId, err: DirectoryError) {
        self.lock().list_failures.insert(application.clone(), err);
    }

    /// The next create for `principal` fails with `err` (queued, one per call).
    pub fn fail_create_once(&self, principal: &PrincipalKey, err: DirectoryError) {
        self.lock()
            .create_failures
            .entry(principal.clone())
            .or_default()
            .push_back(err);
    }

    /// The next delete of `assignment` fails with `err`.
    pub fn fail_delete_once(&self, assignment: &AssignmentId, err: DirectoryError) {
        self.lock()
            .delete_failures
            .entry(assignment.clone())
            .or_default()
            .push_back(err);
    }

    /// Delete `application` once `mutations` mutation calls have completed.
    pub fn vanish_after(&self, application: &ApplicationId, mutations: usize) {
        self.lock().vanish_after = Some((application.clone(), mutations));
    }

    /// Run `hook(n)` after the n-th mutation call completes.
    pub fn on_mutation(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        if let Ok(mut slot) = self.on_mutation.lock() {
            *slot = Some(Arc::new(hook));
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of create and delete calls received.
    pub fn mutation_calls(&self) -> usize {
        self.mutation_calls.load(Ordering::SeqCst)
    }

    /// Current assignments of `application` as `(principal, role)` pairs.
    pub fn grants(&self, application: &ApplicationId) -> Vec<(PrincipalKey, RoleId)> {
        let state = self.lock();
        let mut grants: Vec<_> = state
            .apps
            .get(application)
            .map(|app| {
                app.records
                    .iter()
                    .filter_map(|r| {
                        let kind = r.principal_type.parse::<PrincipalType>().ok()?;
                        Some((
                            PrincipalKey::new(r.principal_id.as_str(), kind),
                            RoleId::from(r.role_id.as_str()),
                        ))
                    })
                    .collect()
            })
            .unwrap_or_default();
        grants.sort();
        grants
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn finish_mutation(&self) {
        let count = self.mutation_calls.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.lock();
            if let Some((app, after)) = state.vanish_after.clone() {
                if count >= after {
                    state.apps.remove(&app);
                }
            }
        }
        let hook = self.on_mutation.lock().ok().and_then(|slot| slot.clone());
        if let Some(hook) = hook {
            hook(count);
        }
    }
}

#[async_trait]
impl DirectoryApi for MemoryDirectory {
    async fn list_assignments(
        &self,
        application: &ApplicationId,
        page: Option<&PageToken>,
    ) -> Result<AssignmentPage, DirectoryError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        if let Some(err) = state.list_failures.get(application) {
            return Err(err.clone());
        }
        let app = state.apps.get(application).ok_or_else(|| DirectoryError::NotFound {
            message: format!("Resource '{application}' does not exist"),
        })?;

        let start = match page {
            Some(token) => token.0.parse::<usize>().map_err(|_| DirectoryError::Unexpected {
                status: 400,
                message: format!("invalid page token '{}'", token.0),
            })?,
            None => 0,
        };
        let end = (start + self.page_size).min(app.records.len());
        let records = app.records.get(start..end).unwrap_or_default().to_vec();
        let next_page = (end < app.records.len()).then(|| PageToken(end.to_string()));
        Ok(AssignmentPage { records, next_page })
    }

    async fn create_assignment(
        &self,
        application: &ApplicationId,
        principal: &PrincipalKey,
        role: &RoleId,
    ) -> Result<CreateOutcome, DirectoryError> {
        let outcome = {
            let mut state = self.lock();
            let scripted = state
                .create_failures
                .get_mut(principal)
                .and_then(VecDeque::pop_front);
            match scripted {
                Some(err) => Err(err),
                None => {
                    state.next_id += 1;
                    let id = format!("mem-{}", state.next_id);
                    match state.apps.get_mut(application) {
                        None => Err(DirectoryError::ApplicationGone {
                            application: application.clone(),
                        }),
                        Some(app) => {
                            let exists = app.records.iter().any(|r| {
                                r.principal_id == principal.id.0
                                    && r.principal_type == principal.kind.to_string()
                                    && r.role_id == role.0
                            });
                            if exists {
                                Ok(CreateOutcome::AlreadyExists)
                            } else {
                                app.records.push(AssignmentRecord {
                                    assignment_id: id.clone(),
                                    principal_id: principal.id.0.clone(),
                                    principal_type: principal.kind.to_string(),
                                    role_id: role.0.clone(),
                                });
                                Ok(CreateOutcome::Created(AssignmentId(id)))
                            }
                        }
                    }
                }
            }
        };
        self.finish_mutation();
        outcome
    }

    async fn delete_assignment(
        &self,
        application: &ApplicationId,
        assignment: &AssignmentId,
    ) -> Result<DeleteOutcome, DirectoryError> {
        let outcome = {
            let mut state = self.lock();
            let scripted = state
                .delete_failures
                .get_mut(assignment)
                .and_then(VecDeque::pop_front);
            match scripted {
                Some(err) => Err(err),
                None => match state.apps.get_mut(application) {
                    None => Err(DirectoryError::ApplicationGone {
                        application: application.clone(),
                    }),
                    Some(app) => {
                        let before = app.records.len();
                        app.records.retain(|r| r.assignment_id != assignment.0);
                        if app.records.len() < before {
                            Ok(DeleteOutcome::Deleted)
                        } else {
                            Ok(DeleteOutcome::AlreadyGone)
                        }
                    }
                },
            }
        };
        self.finish_mutation();
        outcome
    }

    async fn list_app_roles(
        &self,
        application: &ApplicationId,
    ) -> Result<Vec<AppRole>, DirectoryError> {
        let state = self.lock();
        state
            .apps
            .get(application)
            .map(|app| app.roles.clone())
            .ok_or_else(|| DirectoryError::NotFound {
                message: format!("Resource '{application}' does not exist"),
            })
    }
}
