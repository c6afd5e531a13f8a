use std::path::PathBuf;

use mnexec_core::ProcessId;
use mnexec_namespace::backend::Call;
use mnexec_namespace::*;
use nix::sched::CloneFlags;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Check if running as root
fn is_root() -> bool {
    unsafe { libc::getuid() == 0 }
}

fn kinds(list: &[NamespaceKind]) -> NamespaceSet {
    list.iter().copied().collect()
}

#[test]
fn test_create_requests_every_kind_in_one_call() {
    init_tracing();

    let all = [
        NamespaceKind::Network,
        NamespaceKind::Uts,
        NamespaceKind::Pid,
        NamespaceKind::Mount,
    ];

    // Every non-empty subset of the four kinds
    for mask in 1u8..16 {
        let set: NamespaceSet = all
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, kind)| *kind)
            .collect();

        let binder = NamespaceBinder::new(MockBackend::new());
        binder.bind(&NamespaceRequest::create(set)).unwrap();

        let unshares: Vec<_> = binder
            .backend()
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Unshare(_)))
            .collect();

        assert_eq!(unshares, vec![Call::Unshare(set.to_clone_flags())], "mask {mask:#06b}");
    }
}

#[test]
fn test_create_failure_is_all_or_nothing() {
    init_tracing();

    let binder = NamespaceBinder::new(MockBackend::new().failing_unshare());
    let set = kinds(&[NamespaceKind::Network, NamespaceKind::Mount, NamespaceKind::Pid]);

    let err = binder.bind(&NamespaceRequest::create(set)).unwrap_err();

    assert!(err.to_string().starts_with("unshare: "));
    assert_eq!(
        binder.backend().calls(),
        vec![Call::Unshare(
            CloneFlags::CLONE_NEWNET | CloneFlags::CLONE_NEWNS | CloneFlags::CLONE_NEWPID
        )]
    );
}

#[test]
fn test_mount_attach_falls_back_to_chroot() {
    init_tracing();

    let backend = MockBackend::new()
        .with_cwd("/home/mininet/work")
        .failing_join(NamespaceKind::Mount);
    let binder = NamespaceBinder::new(backend);
    let pid = ProcessId::from_raw(4321);

    binder
        .bind(&NamespaceRequest::attach(pid, NamespaceSet::NET_MNT))
        .unwrap();

    let calls = binder.backend().calls();
    assert_eq!(calls.first(), Some(&Call::CurrentDir));
    assert!(calls.contains(&Call::ChangeRoot(PathBuf::from("/proc/4321/root"))));
    assert_eq!(
        calls.last(),
        Some(&Call::ChangeDir(PathBuf::from("/home/mininet/work")))
    );
    assert_eq!(binder.backend().cwd(), PathBuf::from("/home/mininet/work"));
}

#[test]
fn test_mount_attach_falls_back_when_handle_missing() {
    init_tracing();

    let backend = MockBackend::new()
        .with_cwd("/srv")
        .failing_open(NamespaceKind::Mount);
    let binder = NamespaceBinder::new(backend);
    let pid = ProcessId::from_raw(77);

    binder
        .bind(&NamespaceRequest::attach(pid, kinds(&[NamespaceKind::Mount])))
        .unwrap();

    let calls = binder.backend().calls();
    assert!(!calls.contains(&Call::Join(NamespaceKind::Mount)));
    assert!(calls.contains(&Call::ChangeRoot(PathBuf::from("/proc/77/root"))));
    assert_eq!(binder.backend().cwd(), PathBuf::from("/srv"));
}

#[test]
fn test_mount_attach_restores_cwd_after_join() {
    init_tracing();

    let binder = NamespaceBinder::new(MockBackend::new().with_cwd("/tmp/h1"));
    let pid = ProcessId::from_raw(12);

    binder
        .bind(&NamespaceRequest::attach(pid, kinds(&[NamespaceKind::Mount])))
        .unwrap();

    let calls = binder.backend().calls();
    assert!(calls.contains(&Call::Join(NamespaceKind::Mount)));
    assert!(!calls.iter().any(|c| matches!(c, Call::ChangeRoot(_))));
    assert_eq!(binder.backend().cwd(), PathBuf::from("/tmp/h1"));
}

#[test]
fn test_failed_chroot_is_fatal() {
    init_tracing();

    let backend = MockBackend::new()
        .failing_join(NamespaceKind::Mount)
        .failing_change_root();
    let binder = NamespaceBinder::new(backend);

    let err = binder
        .bind(&NamespaceRequest::attach(
            ProcessId::from_raw(3),
            kinds(&[NamespaceKind::Mount]),
        ))
        .unwrap_err();

    assert!(err.to_string().starts_with("chroot /proc/3/root: "));
}

#[test]
fn test_network_join_failure_is_fatal() {
    init_tracing();

    let binder = NamespaceBinder::new(MockBackend::new().failing_join(NamespaceKind::Network));

    let err = binder
        .bind(&NamespaceRequest::attach(
            ProcessId::from_raw(8),
            NamespaceSet::NET_MNT,
        ))
        .unwrap_err();

    assert!(err.to_string().starts_with("setns net: "));
    // Never reached the mount namespace
    assert!(!binder.backend().calls().contains(&Call::Join(NamespaceKind::Mount)));
}

#[test]
fn test_pid_and_uts_failures_are_fatal() {
    init_tracing();

    for kind in [NamespaceKind::Pid, NamespaceKind::Uts] {
        let binder = NamespaceBinder::new(MockBackend::new().failing_open(kind));

        let result = binder.bind(&NamespaceRequest::attach(
            ProcessId::from_raw(8),
            kinds(&[kind]),
        ));

        assert!(result.is_err(), "{kind} open failure must be fatal");
        assert!(!binder.backend().calls().iter().any(|c| matches!(c, Call::Join(_))));
    }
}

#[test]
fn test_attach_pid_requires_fork() {
    let binder = NamespaceBinder::new(MockBackend::new());

    let binding = binder
        .bind(&NamespaceRequest::attach(
            ProcessId::from_raw(8),
            kinds(&[NamespaceKind::Pid, NamespaceKind::Network]),
        ))
        .unwrap();

    assert!(binding.needs_fork());
    assert!(!binding.deferred_proc());

    binder.settle_child(&binding).unwrap();
    assert!(!binder.backend().calls().iter().any(|c| matches!(c, Call::Remount(_))));
}

#[test]
fn test_remount_failure_is_fatal() {
    let binder = NamespaceBinder::new(MockBackend::new().failing_remount(PseudoFs::Sys));

    let err = binder
        .bind(&NamespaceRequest::create(kinds(&[
            NamespaceKind::Network,
            NamespaceKind::Mount,
        ])))
        .unwrap_err();

    assert_eq!(err.to_string().split(':').next(), Some("mount /sys"));
}

#[test]
fn test_private_mount_failure_stops_remounts() {
    init_tracing();

    let binder = NamespaceBinder::new(MockBackend::new().failing_make_private());
    let set = kinds(&[NamespaceKind::Network, NamespaceKind::Mount]);

    let err = binder.bind(&NamespaceRequest::create(set)).unwrap_err();

    assert!(err.to_string().starts_with("set / to private: "));
    assert_eq!(
        binder.backend().calls(),
        vec![
            Call::Unshare(CloneFlags::CLONE_NEWNET | CloneFlags::CLONE_NEWNS),
            Call::MakePrivate,
        ]
    );
}

#[test]
fn test_attach_to_missing_process_fails() {
    let binder = NamespaceBinder::kernel();

    let result = binder.bind(&NamespaceRequest::attach(
        ProcessId::from_raw(i32::MAX),
        kinds(&[NamespaceKind::Network]),
    ));

    assert!(result.is_err());
}

#[test]
#[ignore] // Requires root
fn test_create_network_namespace() {
    if !is_root() {
        return;
    }

    // Run in a forked child so the test process keeps its namespaces
    match supervisor::fork_into_namespace().unwrap() {
        Checkpoint::Child => {
            let binder = NamespaceBinder::kernel();
            let code = match binder.bind(&NamespaceRequest::create(kinds(&[NamespaceKind::Network]))) {
                Ok(_) => 0,
                Err(_) => 1,
            };
            // SAFETY: leave the forked test process without running the harness
            unsafe { libc::_exit(code) }
        }
        Checkpoint::Parent(child) => {
            assert_eq!(child.wait().unwrap(), 0);
        }
    }
}
