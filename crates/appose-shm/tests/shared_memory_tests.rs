use appose_shm::{DType, MemoryOrder, NDArray, ShmError, SharedMemory};

#[test]
fn create_then_attach_sees_same_bytes() {
    let mut owner = SharedMemory::create(None, 64).expect("create");
    owner.as_mut_slice()[0] = 0xAB;
    owner.as_mut_slice()[63] = 0xCD;

    let name = owner.name().to_string();
    let attached = SharedMemory::attach(&name, 64).expect("attach");
    assert_eq!(attached.as_slice()[0], 0xAB);
    assert_eq!(attached.as_slice()[63], 0xCD);

    drop(attached);
    owner.unlink().expect("unlink");
}

#[test]
fn create_with_explicit_name_rejects_duplicate() {
    let name = format!("/appose-test-dup-{}", std::process::id());
    let first = SharedMemory::create(Some(&name), 16).expect("first create");
    let second = SharedMemory::create(Some(&name), 16);
    assert!(matches!(second, Err(ShmError::Exists(_))));

    first.unlink().ok();
}

#[test]
fn attach_to_missing_name_fails() {
    let name = format!("/appose-test-missing-{}", std::process::id());
    let err = SharedMemory::attach(&name, 16).unwrap_err();
    assert!(matches!(err, ShmError::NotFound(_)));
}

#[test]
fn close_is_idempotent() {
    let mut shm = SharedMemory::create(None, 8).unwrap();
    shm.close().unwrap();
    shm.close().unwrap();
}

#[test]
fn unlink_is_idempotent() {
    let shm = SharedMemory::create(None, 8).unwrap();
    shm.unlink().unwrap();
    shm.unlink().unwrap();
}

#[test]
fn pointer_is_none_after_close() {
    let mut shm = SharedMemory::create(None, 8).unwrap();
    assert!(shm.pointer().is_some());
    shm.close().unwrap();
    assert!(shm.pointer().is_none());
}

#[test]
fn ndarray_wrap_rejects_undersized_backing_shm() {
    let shm = SharedMemory::create(None, 4).unwrap();
    let err = NDArray::wrap(DType::Float64, vec![2, 2], MemoryOrder::COrder, shm).unwrap_err();
    assert!(matches!(err, ShmError::TooSmall { .. }));
}

#[test]
fn ndarray_create_sizes_backing_shm_exactly() {
    let nd = NDArray::create(DType::Float32, vec![2, 20, 25], MemoryOrder::COrder).unwrap();
    assert_eq!(nd.shm().size(), 2 * 20 * 25 * 4);
    assert_eq!(nd.as_bytes().len(), (2 * 20 * 25 * 4) as usize);
}

#[test]
fn ndarray_to_ref_round_trips_through_codec() {
    let nd = NDArray::create(DType::Int16, vec![3, 4], MemoryOrder::COrder).unwrap();
    let nd_ref = nd.to_ref();
    assert_eq!(nd_ref.dtype, DType::Int16);
    assert_eq!(nd_ref.shape, vec![3, 4]);
    assert_eq!(nd_ref.shm.size, nd.shm().size());
}
