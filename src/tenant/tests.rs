use super::*;

#[test]
fn triple_new_accepts_empty_team_and_project() {
    let triple = TenantTriple::new("acme", "", "").unwrap();
    assert_eq!(triple.tenant_id, "acme");
    assert!(triple.team_id.is_empty());
    assert!(triple.project_id.is_empty());
}

#[test]
fn triple_new_rejects_empty_tenant() {
    let err = TenantTriple::new("", "", "").unwrap_err();
    assert!(matches!(err, ContextdError::InvalidTenant(_)));
}

#[test]
fn triple_new_rejects_traversal_like_tenant() {
    let err = TenantTriple::new("../etc", "", "").unwrap_err();
    assert!(matches!(err, ContextdError::InvalidTenant(_)));
}

#[test]
fn context_round_trips_triple() {
    let triple = TenantTriple::new("acme", "core", "contextd").unwrap();
    let ctx = with_tenant(triple.clone());
    assert_eq!(tenant_from(&ctx), &triple);
}

#[test]
fn context_clone_is_cheap_and_shares_data() {
    let triple = TenantTriple::new("acme", "", "").unwrap();
    let ctx = TenantContext::new(triple);
    let cloned = ctx.clone();
    assert_eq!(ctx.tenant_id(), cloned.tenant_id());
}

#[test]
fn derive_tenant_for_path_is_stable() {
    let path = Path::new("/home/user/project");
    let first = derive_tenant_for_path(path).unwrap();
    let second = derive_tenant_for_path(path).unwrap();
    assert_eq!(first, second);
}

#[test]
fn derive_tenant_for_path_differs_across_paths() {
    let a = derive_tenant_for_path(Path::new("/home/user/a")).unwrap();
    let b = derive_tenant_for_path(Path::new("/home/user/b")).unwrap();
    assert_ne!(a, b);
}

#[test]
fn derive_tenant_for_path_rejects_empty_path() {
    let err = derive_tenant_for_path(Path::new("")).unwrap_err();
    assert!(matches!(err, ContextdError::InvalidTenant(_)));
}

#[test]
fn derive_tenant_for_path_produces_a_valid_tenant_id() {
    let derived = derive_tenant_for_path(Path::new("/home/user/project")).unwrap();
    assert!(TenantTriple::new(derived, "", "").is_ok());
}
