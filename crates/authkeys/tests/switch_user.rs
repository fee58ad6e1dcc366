//! Account switching as root. Kept in its own test binary because changing the
//! effective ids is process-wide and would leak into concurrent tests.

#![cfg(unix)]

use authkeys::{
    PrivilegeContext, SwitchUser, effective_uid, is_root, lookup_account, supplementary_groups,
};

#[test]
fn test_switch_user_takes_owner_groups_and_restores_them() {
    if !is_root() {
        return;
    }
    let Ok(account) = lookup_account("nobody") else {
        return;
    };

    let before = supplementary_groups().unwrap();

    {
        let _guard = SwitchUser.assume("nobody").unwrap();
        assert_eq!(effective_uid(), account.uid);

        let inside = supplementary_groups().unwrap();
        assert!(inside.contains(&account.gid), "{inside:?}");
        if account.gid != 0 {
            assert!(!inside.contains(&0), "root group kept: {inside:?}");
        }
    }

    assert_eq!(effective_uid(), 0);
    assert_eq!(supplementary_groups().unwrap(), before);
}
