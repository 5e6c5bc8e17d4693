use super::model::{ApplicationStatus, SellerApplication};
use crate::activity::ActivityLog;
use crate::error::{AdminError, AdminResult};
use crate::listing::{decode_documents, list_page, Page, PageRequest};
use crate::now_timestamp;
use crate::store::{DocumentStore, Fields, Filter, Query, StoreError, Write};
use crate::users::{self, roles_value, Role, User};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

const COLLECTION: &str = "sellers";
const USERS: &str = "users";

/// Result of a successful approve/reject, for patching local state.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub application: SellerApplication,
    /// The owner's role set after approval; `None` for rejections.
    pub roles: Option<BTreeSet<Role>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub repaired: Vec<String>,
    pub missing_users: Vec<String>,
}

pub async fn get_application(
    store: &dyn DocumentStore,
    application_id: &str,
) -> AdminResult<SellerApplication> {
    let doc = store
        .get(COLLECTION, application_id)
        .await
        .map_err(|source| AdminError::QueryFailed {
            entity: "seller applications",
            source,
        })?
        .ok_or_else(|| AdminError::NotFound(format!("seller application {}", application_id)))?;

    decode_documents::<SellerApplication>(vec![doc])
        .pop()
        .ok_or_else(|| AdminError::NotFound(format!("seller application {}", application_id)))
}

/// One page of applications, newest first. `None` lists every status.
pub async fn list_applications(
    store: &dyn DocumentStore,
    status: Option<ApplicationStatus>,
    page_size: usize,
    after: Option<String>,
) -> AdminResult<Page<SellerApplication>> {
    let mut request = PageRequest::new(page_size).after(after);
    if let Some(status) = status {
        request = request.filter(Filter::eq("status", status.as_str()));
    }
    list_page(store, &request).await
}

/// Role set of an approved seller: existing roles plus `seller` and `user`.
pub fn seller_roles(existing: &BTreeSet<Role>) -> BTreeSet<Role> {
    let mut roles = existing.clone();
    roles.insert(Role::Seller);
    roles.insert(Role::User);
    roles
}

/// Load the application and check the requested transition is allowed.
async fn load_for_decision(
    store: &dyn DocumentStore,
    application_id: &str,
    user_id: &str,
    next: ApplicationStatus,
) -> AdminResult<SellerApplication> {
    let application = get_application(store, application_id).await?;

    if application.owner_id() != user_id {
        return Err(AdminError::InvalidRequest(format!(
            "application {} does not belong to user {}",
            application_id, user_id
        )));
    }
    if !application.status.can_transition_to(next) {
        tracing::warn!(
            "Refusing {} -> {} for seller application {}",
            application.status,
            next,
            application_id
        );
        return Err(AdminError::InvalidTransition {
            from: application.status,
            to: next,
        });
    }
    Ok(application)
}

/// The application's status write. It only lands while the stored status is
/// still the one the decision was made from.
fn status_write(
    application_id: &str,
    from: ApplicationStatus,
    to: ApplicationStatus,
    now: &str,
) -> Write {
    let mut fields = Fields::new();
    fields.insert("status".to_string(), Value::String(to.as_str().to_string()));
    fields.insert(
        "verificationStatus".to_string(),
        Value::String(to.as_str().to_string()),
    );
    fields.insert("updatedAt".to_string(), Value::String(now.to_string()));
    Write::Update {
        collection: COLLECTION.to_string(),
        id: application_id.to_string(),
        fields,
        expect: Some(("status".to_string(), Value::String(from.as_str().to_string()))),
    }
}

/// Map a failed decision batch. A conflict means another decision landed first;
/// report the status it left behind.
async fn decision_failed(
    store: &dyn DocumentStore,
    application_id: &str,
    next: ApplicationStatus,
    error: StoreError,
) -> AdminError {
    if let StoreError::Conflict(_) = &error {
        if let Ok(current) = get_application(store, application_id).await {
            if !current.status.can_transition_to(next) {
                tracing::warn!(
                    "Seller application {} was decided concurrently as {}",
                    application_id,
                    current.status
                );
                return AdminError::InvalidTransition {
                    from: current.status,
                    to: next,
                };
            }
        }
    }
    tracing::error!(
        "Error deciding seller application {} as {}: {}",
        application_id,
        next,
        error
    );
    AdminError::WorkflowFailed(error)
}

/// Approve a pending application and grant its owner the seller role.
///
/// The application update, the role update and the activity entry commit as one
/// batch, so a failure leaves both records as they were.
pub async fn approve(
    store: &dyn DocumentStore,
    application_id: &str,
    user_id: &str,
) -> AdminResult<Decision> {
    let mut application =
        load_for_decision(store, application_id, user_id, ApplicationStatus::Approved).await?;
    let user = users::get_user(store, user_id).await?;

    let now = now_timestamp();
    let roles = seller_roles(&user.roles);

    let mut user_fields = Fields::new();
    user_fields.insert("roles".to_string(), roles_value(&roles));
    user_fields.insert("updatedAt".to_string(), Value::String(now.clone()));

    let mut log = ActivityLog::new(
        "seller_approved",
        format!("Seller application approved for {}", display_business(&application)),
        &now,
    );
    log.user_id = Some(user_id.to_string());
    log.application_id = Some(application_id.to_string());

    let writes = vec![
        status_write(
            application_id,
            application.status,
            ApplicationStatus::Approved,
            &now,
        ),
        Write::Update {
            collection: USERS.to_string(),
            id: user_id.to_string(),
            fields: user_fields,
            expect: None,
        },
        log.into_write(),
    ];

    if let Err(e) = store.commit(writes).await {
        return Err(decision_failed(store, application_id, ApplicationStatus::Approved, e).await);
    }

    tracing::info!(
        "Approved seller application {} for user {}",
        application_id,
        user_id
    );
    application.status = ApplicationStatus::Approved;
    application.verification_status = Some(ApplicationStatus::Approved.as_str().to_string());
    application.updated_at = Some(now);
    Ok(Decision {
        application,
        roles: Some(roles),
    })
}

/// Reject a pending application. The owner's user record is not touched.
pub async fn reject(
    store: &dyn DocumentStore,
    application_id: &str,
    user_id: &str,
) -> AdminResult<Decision> {
    let mut application =
        load_for_decision(store, application_id, user_id, ApplicationStatus::Rejected).await?;

    let now = now_timestamp();
    let mut log = ActivityLog::new(
        "seller_rejected",
        format!("Seller application rejected for {}", display_business(&application)),
        &now,
    );
    log.user_id = Some(user_id.to_string());
    log.application_id = Some(application_id.to_string());

    let writes = vec![
        status_write(
            application_id,
            application.status,
            ApplicationStatus::Rejected,
            &now,
        ),
        log.into_write(),
    ];

    if let Err(e) = store.commit(writes).await {
        return Err(decision_failed(store, application_id, ApplicationStatus::Rejected, e).await);
    }

    tracing::info!(
        "Rejected seller application {} for user {}",
        application_id,
        user_id
    );
    application.status = ApplicationStatus::Rejected;
    application.verification_status = Some(ApplicationStatus::Rejected.as_str().to_string());
    application.updated_at = Some(now);
    Ok(Decision {
        application,
        roles: None,
    })
}

/// Grant the seller role to owners of approved applications that lack it.
///
/// Repairs records left behind by older two-step approvals. Owners with no user
/// record are reported, not created.
pub async fn reconcile_approved_sellers(store: &dyn DocumentStore) -> AdminResult<ReconcileReport> {
    let query = Query::collection(COLLECTION).filter(Filter::eq(
        "status",
        ApplicationStatus::Approved.as_str(),
    ));
    let docs = store
        .query(&query)
        .await
        .map_err(|source| AdminError::QueryFailed {
            entity: "seller applications",
            source,
        })?;
    let applications = decode_documents::<SellerApplication>(docs);

    let mut report = ReconcileReport {
        scanned: applications.len(),
        ..Default::default()
    };

    for application in &applications {
        let owner = application.owner_id();
        let user: Option<User> = users::find_user(store, owner).await?;
        let Some(user) = user else {
            tracing::warn!(
                "Approved application {} references missing user {}",
                application.id,
                owner
            );
            report.missing_users.push(owner.to_string());
            continue;
        };
        if user.has_role(Role::Seller) {
            continue;
        }

        users::set_user_roles(store, owner, seller_roles(&user.roles))
            .await
            .map_err(|e| match e {
                AdminError::MutationFailed { source, .. } => AdminError::WorkflowFailed(source),
                other => other,
            })?;
        tracing::info!("Reconciled seller role for user {}", owner);
        report.repaired.push(owner.to_string());
    }

    Ok(report)
}

fn display_business(application: &SellerApplication) -> String {
    if application.business_name.trim().is_empty() {
        application.full_name()
    } else {
        application.business_name.clone()
    }
}
