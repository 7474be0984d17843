use nix::unistd::{Gid, Group, Uid, User};

pub fn user_name(uid: u32) -> String {
    User::from_uid(Uid::from_raw(uid))
        .ok()
        .flatten()
        .map(|u| u.name)
        .unwrap_or_else(|| uid.to_string())
}

pub fn group_name(gid: u32) -> String {
    Group::from_gid(Gid::from_raw(gid))
        .ok()
        .flatten()
        .map(|g| g.name)
        .unwrap_or_else(|| gid.to_string())
}

/// Name of the user this process runs as.
pub fn process_user() -> String {
    user_name(nix::unistd::geteuid().as_raw())
}

/// Groups of `user` according to the host's group database. Unknown users
/// have no groups.
pub fn host_groups(user: &str) -> Vec<String> {
    let Ok(Some(account)) = User::from_name(user) else {
        return Vec::new();
    };

    #[cfg(target_os = "linux")]
    {
        let Ok(name) = std::ffi::CString::new(user) else {
            return vec![group_name(account.gid.as_raw())];
        };
        match nix::unistd::getgrouplist(&name, account.gid) {
            Ok(gids) => gids.into_iter().map(|g| group_name(g.as_raw())).collect(),
            Err(e) => {
                tracing::warn!("getgrouplist failed for {}: {}", user, e);
                vec![group_name(account.gid.as_raw())]
            }
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        vec![group_name(account.gid.as_raw())]
    }
}
