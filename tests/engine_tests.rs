use evm_stepper::trace::channel;
use evm_stepper::{
    run, Account, AccountRegistry, EvmConfig, EvmError, ExecutionContext, Halt, NoopObserver, RecordingObserver,
    Step, StepSignal,
};
use primitive_types::U256;

fn exec(code: &[u8]) -> evm_stepper::ExecutionResult {
    exec_with(code, &ExecutionContext::default(), EvmConfig::default())
}

fn exec_with(code: &[u8], ctx: &ExecutionContext, config: EvmConfig) -> evm_stepper::ExecutionResult {
    run(code, ctx, &AccountRegistry::new(), config, &mut NoopObserver).expect("run")
}

#[test]
fn add_then_stop_leaves_sum_on_stack() {
    let mut before_stop = Vec::new();
    let mut observer = |step: &Step<'_>| {
        if step.is_final {
            before_stop = step.stack.as_slice().to_vec();
        }
        StepSignal::Continue
    };
    let result = run(
        &[0x60, 0x05, 0x60, 0x03, 0x01, 0x00],
        &ExecutionContext::default(),
        &AccountRegistry::new(),
        EvmConfig::default(),
        &mut observer,
    )
    .unwrap();
    assert_eq!(result.halt, Halt::Stop);
    assert!(result.output.is_empty());
    assert_eq!(result.stack.as_slice(), &[U256::from(8)]);
    assert_eq!(before_stop, vec![U256::from(8)]);
}

#[test]
fn calldataload_reads_big_endian_word() {
    let data: Vec<u8> = (0x11..0x31).collect();
    let ctx = ExecutionContext::default().with_calldata(data.clone());
    let result = exec_with(&[0x60, 0x00, 0x35], &ctx, EvmConfig::default());
    assert_eq!(result.stack.top(), Some(&U256::from_big_endian(&data)));
}

#[test]
fn calldataload_pads_short_data_on_the_right() {
    let ctx = ExecutionContext::default().with_calldata(vec![0xff]);
    let result = exec_with(&[0x60, 0x00, 0x35, 0x36], &ctx, EvmConfig::default());
    let mut padded = [0u8; 32];
    padded[0] = 0xff;
    assert_eq!(result.stack.as_slice(), &[U256::from_big_endian(&padded), U256::one()]);
}

#[test]
fn sstore_then_sload_round_trips_and_first_write_costs_more() {
    // PUSH1 0x2a; PUSH1 0; SSTORE; PUSH1 0; SLOAD
    let result = exec(&[0x60, 0x2a, 0x60, 0x00, 0x55, 0x60, 0x00, 0x54]);
    assert_eq!(result.stack.top(), Some(&U256::from(0x2a)));
    assert_eq!(result.storage.load(U256::zero()), U256::from(0x2a));

    let mut recorder = RecordingObserver::new();
    // PUSH1 0x2a; PUSH1 0; SSTORE; PUSH1 0x2b; PUSH1 0; SSTORE
    let code = [0x60, 0x2a, 0x60, 0x00, 0x55, 0x60, 0x2b, 0x60, 0x00, 0x55];
    run(&code, &ExecutionContext::default(), &AccountRegistry::new(), EvmConfig::default(), &mut recorder).unwrap();
    let gas: Vec<u64> = recorder.steps.iter().map(|s| s.gas_used).collect();
    let first = gas[2] - gas[1];
    let second = gas[5] - gas[4];
    assert_eq!(first, 20_000);
    assert_eq!(second, 5_000);
    assert!(first > second);
}

#[test]
fn jump_beyond_code_halts() {
    // PUSH1 0xff; JUMP; PUSH1 1
    let result = exec(&[0x60, 0xff, 0x56, 0x60, 0x01]);
    assert_eq!(result.halt, Halt::Stop);
    assert!(result.stack.is_empty());
}

#[test]
fn jump_validation_rejects_non_jumpdest() {
    let config = EvmConfig { validate_jumps: true, ..EvmConfig::default() };
    let err = run(&[0x60, 0xff, 0x56], &ExecutionContext::default(), &AccountRegistry::new(), config.clone(), &mut NoopObserver)
        .unwrap_err();
    assert_eq!(err, EvmError::InvalidJump(U256::from(0xff)));

    // PUSH1 4; JUMP; INVALID; JUMPDEST; PUSH1 7
    let result =
        run(&[0x60, 0x04, 0x56, 0xfe, 0x5b, 0x60, 0x07], &ExecutionContext::default(), &AccountRegistry::new(), config, &mut NoopObserver)
            .unwrap();
    assert_eq!(result.stack.top(), Some(&U256::from(7)));
}

#[test]
fn jumpi_only_jumps_on_nonzero() {
    // PUSH1 0; PUSH1 8; JUMPI; PUSH1 1; STOP; ... ; JUMPDEST(8); PUSH1 2
    let code = [0x60, 0x00, 0x60, 0x08, 0x57, 0x60, 0x01, 0x00, 0x5b, 0x60, 0x02];
    assert_eq!(exec(&code).stack.as_slice(), &[U256::one()]);
    let mut taken = code;
    taken[1] = 0x01;
    assert_eq!(exec(&taken).stack.as_slice(), &[U256::from(2)]);
}

#[test]
fn revert_discards_storage_and_is_not_committed() {
    let address = U256::from(0xaa);
    let mut registry = AccountRegistry::new();
    let account = registry.create_account(address);
    account.storage.store(U256::one(), U256::from(5));
    let ctx = ExecutionContext::for_account(registry.get_account(address));

    // PUSH1 9; PUSH1 1; SSTORE; PUSH1 0xab; PUSH1 0; MSTORE8; PUSH1 1; PUSH1 0; REVERT
    let code = [0x60, 0x09, 0x60, 0x01, 0x55, 0x60, 0xab, 0x60, 0x00, 0x53, 0x60, 0x01, 0x60, 0x00, 0xfd];
    let result = run(&code, &ctx, &registry, EvmConfig::default(), &mut NoopObserver).unwrap();
    assert_eq!(result.halt, Halt::Revert);
    assert_eq!(result.output, vec![0xab]);
    assert_eq!(result.storage.load(U256::one()), U256::from(5));

    assert!(!registry.commit(address, &result));
    assert_eq!(registry.get_account(address).storage.load(U256::one()), U256::from(5));
    assert_eq!(result.into_output(), Err(EvmError::Revert(vec![0xab])));
}

#[test]
fn successful_run_commits_storage() {
    let address = U256::from(0xaa);
    let mut registry = AccountRegistry::new();
    registry.create_account(address);
    let ctx = ExecutionContext::for_account(registry.get_account(address));
    let result = run(&[0x60, 0x09, 0x60, 0x01, 0x55], &ctx, &registry, EvmConfig::default(), &mut NoopObserver).unwrap();
    assert!(registry.commit(address, &result));
    assert_eq!(registry.get_account(address).storage.load(U256::one()), U256::from(9));
}

#[test]
fn stack_overflow_on_1025th_push() {
    let err = run(&[0x5f; 1025], &ExecutionContext::default(), &AccountRegistry::new(), EvmConfig::default(), &mut NoopObserver)
        .unwrap_err();
    assert_eq!(err, EvmError::StackOverflow(1024));
    assert_eq!(exec(&[0x5f; 1024]).stack.len(), 1024);
}

#[test]
fn gas_limit_raises_out_of_gas() {
    let config = EvmConfig { gas_limit: Some(5), ..EvmConfig::default() };
    let err = run(&[0x60, 0x01, 0x60, 0x01, 0x01], &ExecutionContext::default(), &AccountRegistry::new(), config, &mut NoopObserver)
        .unwrap_err();
    assert!(matches!(err, EvmError::OutOfGas { limit: 5, .. }), "{err:?}");
}

#[test]
fn observer_sees_each_step_then_a_final_one() {
    let mut recorder = RecordingObserver::new();
    run(&[0x60, 0x05, 0x60, 0x03, 0x01, 0x00], &ExecutionContext::default(), &AccountRegistry::new(), EvmConfig::default(), &mut recorder)
        .unwrap();
    let pcs: Vec<usize> = recorder.steps.iter().map(|s| s.pc).collect();
    assert_eq!(pcs, vec![2, 4, 5, 6]);
    assert!(recorder.steps.iter().take(3).all(|s| !s.is_final));
    assert!(recorder.steps[3].is_final);
    assert_eq!(recorder.steps[3].stack, vec!["0x8"]);
}

#[test]
fn recording_observer_cancels_after_max_steps() {
    // JUMPDEST; PUSH1 0; JUMP
    let mut recorder = RecordingObserver::with_max_steps(10);
    let err = run(&[0x5b, 0x60, 0x00, 0x56], &ExecutionContext::default(), &AccountRegistry::new(), EvmConfig::default(), &mut recorder)
        .unwrap_err();
    assert!(matches!(err, EvmError::Cancelled(_)));
    assert_eq!(recorder.steps.len(), 10);
}

#[test]
fn channel_observer_paces_the_run_from_another_thread() {
    let (mut observer, handle) = channel();
    let ctx = ExecutionContext::default();
    let registry = AccountRegistry::new();
    let code = [0x60, 0x01, 0x60, 0x02, 0x60, 0x03, 0x00];

    let outcome = std::thread::scope(|s| {
        let (ctx, registry) = (&ctx, &registry);
        let engine = s.spawn(move || run(&code, ctx, registry, EvmConfig::default(), &mut observer));

        let first = handle.next_step().expect("first step");
        assert_eq!(first.pc, 2);
        assert_eq!(first.stack, vec!["0x1"]);
        handle.resume();

        let second = handle.next_step().expect("second step");
        assert_eq!(second.stack, vec!["0x1", "0x2"]);
        handle.cancel();

        engine.join().expect("engine thread")
    });
    assert_eq!(outcome.unwrap_err(), EvmError::Cancelled(4));
    assert!(handle.next_step().is_none());
}

#[test]
fn channel_observer_runs_to_completion() {
    let (mut observer, handle) = channel();
    let ctx = ExecutionContext::default();
    let registry = AccountRegistry::new();

    let result = std::thread::scope(|s| {
        let (ctx, registry) = (&ctx, &registry);
        let engine = s.spawn(move || run(&[0x60, 0x01, 0x00], ctx, registry, EvmConfig::default(), &mut observer));
        let mut seen = 0;
        while let Some(step) = handle.next_step() {
            seen += 1;
            handle.resume();
            if step.is_final {
                break;
            }
        }
        assert_eq!(seen, 2);
        engine.join().expect("engine thread")
    });
    assert_eq!(result.unwrap().halt, Halt::Stop);
}

#[test]
fn environment_opcodes_read_the_context() {
    let mut account = Account::new(U256::from(0xaa));
    account.balance = U256::from(1000);
    let mut ctx = ExecutionContext::for_account(account);
    ctx.message.caller = U256::from(0xbb);
    ctx.message.value = U256::from(3);
    ctx.block.number = U256::from(42);
    // ADDRESS; CALLER; CALLVALUE; SELFBALANCE; NUMBER; CHAINID
    let result = exec_with(&[0x30, 0x33, 0x34, 0x47, 0x43, 0x46], &ctx, EvmConfig::default());
    let expected: Vec<U256> = [0xaau64, 0xbb, 3, 1000, 42, 1].into_iter().map(U256::from).collect();
    assert_eq!(result.stack.as_slice(), expected.as_slice());
}

#[test]
fn extcodesize_and_balance_read_the_registry() {
    let mut registry = AccountRegistry::new();
    let other = U256::from(0xcc);
    registry.create_account(other).balance = U256::from(77);
    registry.set_code(other, vec![0x60, 0x01, 0x00]).unwrap();
    // PUSH1 0xcc; BALANCE; PUSH1 0xcc; EXTCODESIZE
    let code = [0x60, 0xcc, 0x31, 0x60, 0xcc, 0x3b];
    let result = run(&code, &ExecutionContext::default(), &registry, EvmConfig::default(), &mut NoopObserver).unwrap();
    assert_eq!(result.stack.as_slice(), &[U256::from(77), U256::from(3)]);
}

#[test]
fn returndatacopy_of_nothing_is_allowed() {
    // RETURNDATASIZE; PUSH1 0; PUSH1 0; PUSH1 0; RETURNDATACOPY
    let result = exec(&[0x3d, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x3e]);
    assert_eq!(result.stack.as_slice(), &[U256::zero()]);

    // PUSH1 1; PUSH1 0; PUSH1 0; RETURNDATACOPY
    let err = run(&[0x60, 0x01, 0x60, 0x00, 0x60, 0x00, 0x3e], &ExecutionContext::default(), &AccountRegistry::new(), EvmConfig::default(), &mut NoopObserver)
        .unwrap_err();
    assert_eq!(err, EvmError::ReturnDataOutOfBounds);
}

#[test]
fn sha3_hashes_memory_range() {
    // PUSH1 0; PUSH1 0; SHA3
    let result = exec(&[0x60, 0x00, 0x60, 0x00, 0x20]);
    assert_eq!(result.stack.top(), Some(&evm_stepper::hash::sha3_word(&[])));
}

#[test]
fn mload_far_past_written_memory_reads_zero() {
    // PUSH4 0x02000000; MLOAD; MSIZE
    let result = exec(&[0x63, 0x02, 0x00, 0x00, 0x00, 0x51, 0x59]);
    assert_eq!(result.stack.as_slice(), &[U256::zero(), U256::from(0x0200_0020u64)]);
}

#[test]
fn mstore_then_mload_at_a_far_offset() {
    // PUSH1 0x2a; PUSH4 0x02000000; MSTORE; PUSH4 0x02000000; MLOAD
    let code = [0x60, 0x2a, 0x63, 0x02, 0x00, 0x00, 0x00, 0x52, 0x63, 0x02, 0x00, 0x00, 0x00, 0x51];
    let result = exec(&code);
    assert_eq!(result.stack.as_slice(), &[U256::from(0x2a)]);
    assert_eq!(result.memory.pages().count(), 1);
}

#[test]
fn jump_lands_on_the_destination_byte() {
    // PUSH1 4; JUMP; INVALID; JUMPDEST; PUSH1 7
    let code = [0x60, 0x04, 0x56, 0xfe, 0x5b, 0x60, 0x07];
    let mut recorder = RecordingObserver::new();
    let result = run(&code, &ExecutionContext::default(), &AccountRegistry::new(), EvmConfig::default(), &mut recorder)
        .unwrap();
    assert_eq!(result.stack.as_slice(), &[U256::from(7)]);
    // PUSH1 3 + JUMP 8 + JUMPDEST 1 + PUSH1 3
    assert_eq!(result.gas_used, 15);

    let pcs: Vec<usize> = recorder.steps.iter().map(|s| s.pc).collect();
    let ops: Vec<&str> = recorder.steps.iter().map(|s| s.mnemonic).collect();
    assert_eq!(pcs, vec![2, 4, 5, 7, 7]);
    assert_eq!(ops, vec!["PUSH1", "JUMP", "JUMPDEST", "PUSH1", "PUSH1"]);
}

#[test]
fn jumpi_taken_reports_the_destination_as_next_pc() {
    // PUSH1 1; PUSH1 6; JUMPI; STOP; STOP; JUMPDEST; PUSH1 2
    let code = [0x60, 0x01, 0x60, 0x06, 0x57, 0x00, 0x5b, 0x60, 0x02];
    let mut recorder = RecordingObserver::new();
    let result = run(&code, &ExecutionContext::default(), &AccountRegistry::new(), EvmConfig::default(), &mut recorder)
        .unwrap();
    assert_eq!(result.stack.as_slice(), &[U256::from(2)]);
    assert_eq!(result.gas_used, 3 + 3 + 10 + 1 + 3);
    assert_eq!(recorder.steps[2].pc, 6);
    assert_eq!(recorder.steps[3].mnemonic, "JUMPDEST");
}

fn push_sequence(values: std::ops::RangeInclusive<u8>) -> Vec<u8> {
    values.flat_map(|v| [0x60, v]).collect()
}

#[test]
fn dup_opcodes_copy_by_depth() {
    // PUSH1 5; PUSH1 9; DUP1
    assert_eq!(exec(&[0x60, 0x05, 0x60, 0x09, 0x80]).stack.as_slice(), &[5u64, 9, 9].map(U256::from));

    let mut code = push_sequence(1..=16);
    code.push(0x8f); // DUP16
    let result = exec(&code);
    assert_eq!(result.stack.len(), 17);
    assert_eq!(result.stack.top(), Some(&U256::one()));

    let mut short = push_sequence(1..=15);
    short.push(0x8f);
    let err = run(&short, &ExecutionContext::default(), &AccountRegistry::new(), EvmConfig::default(), &mut NoopObserver)
        .unwrap_err();
    assert_eq!(err, EvmError::StackUnderflow);
}

#[test]
fn swap_opcodes_exchange_by_depth() {
    // PUSH1 5; PUSH1 9; SWAP1
    assert_eq!(exec(&[0x60, 0x05, 0x60, 0x09, 0x90]).stack.as_slice(), &[9u64, 5].map(U256::from));

    let mut code = push_sequence(1..=17);
    code.push(0x9f); // SWAP16
    let result = exec(&code);
    let stack = result.stack.as_slice();
    assert_eq!(stack.len(), 17);
    assert_eq!(stack[0], U256::from(17));
    assert_eq!(stack[16], U256::one());
    assert_eq!(stack[1], U256::from(2));
}
