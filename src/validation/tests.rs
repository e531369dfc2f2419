use super::*;

#[test]
fn rejects_parent_dir_traversal() {
    let err = validate_project_path("/home/user/../etc/passwd", None).unwrap_err();
    assert!(matches!(err, ContextdError::InvalidInput { field, .. } if field == "project_path"));
}

#[test]
fn accepts_plain_absolute_path() {
    let path = validate_project_path("/home/user/project", None).unwrap();
    assert_eq!(path, PathBuf::from("/home/user/project"));
}

#[test]
fn rejects_path_escaping_configured_root() {
    let root = Path::new("/workspace");
    let err = validate_project_path("/etc/passwd", Some(root)).unwrap_err();
    assert!(matches!(err, ContextdError::InvalidInput { .. }));
}

#[test]
fn accepts_path_under_configured_root() {
    let root = Path::new("/workspace");
    let path = validate_project_path("/workspace/repo", Some(root)).unwrap();
    assert_eq!(path, PathBuf::from("/workspace/repo"));
}

#[test]
fn rejects_null_byte_in_path() {
    let err = validate_project_path("/home/user/\0evil", None).unwrap_err();
    assert!(matches!(err, ContextdError::InvalidInput { .. }));
}

#[test]
fn tenant_id_rejects_empty() {
    assert!(validate_tenant_id("").is_err());
}

#[test]
fn team_id_allows_empty() {
    assert!(validate_team_id("").is_ok());
}

#[test]
fn tenant_id_rejects_traversal_like_value() {
    assert!(validate_tenant_id("../etc").is_err());
}

#[test]
fn tenant_id_rejects_over_length() {
    let long = "a".repeat(65);
    assert!(validate_tenant_id(&long).is_err());
}

#[test]
fn tenant_id_accepts_valid_value() {
    assert!(validate_tenant_id("acme-corp_01").is_ok());
}

#[test]
fn glob_patterns_reject_traversal() {
    let patterns = vec!["src/**/*.rs".to_string(), "../outside/**".to_string()];
    assert!(validate_glob_patterns(&patterns).is_err());
}

#[test]
fn glob_patterns_accept_plain() {
    let patterns = vec!["src/**/*.rs".to_string(), "!target/**".to_string()];
    assert!(validate_glob_patterns(&patterns).is_ok());
}

#[test]
fn derive_project_id_sanitises_basename() {
    let id = derive_project_id(Path::new("/home/user/My Cool Project!!"));
    assert_eq!(id, "my-cool-project");
}

#[test]
fn derive_project_id_handles_empty_basename() {
    let id = derive_project_id(Path::new("/"));
    assert_eq!(id, "project");
}
