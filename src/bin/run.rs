use evm_stepper::codec::{bytes_to_hex, hex_to_bytes};
use evm_stepper::{AccountRegistry, EvmConfig, ExecutionContext, NoopObserver};
use std::env;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: evm-run <bytecode-hex> [gas-limit]");
        eprintln!("Example: evm-run 0x604260ff01");
        std::process::exit(1);
    }
    let code = hex_to_bytes(&args[1]).unwrap_or_else(|_| {
        eprintln!("Invalid hex input");
        std::process::exit(1);
    });
    let gas_limit = args.get(2).and_then(|g| g.parse::<u64>().ok());
    let cfg = EvmConfig { gas_limit, ..EvmConfig::default() };
    let ctx = ExecutionContext::default();
    let accounts = AccountRegistry::new();
    match evm_stepper::run(&code, &ctx, &accounts, cfg, &mut NoopObserver) {
        Ok(result) => {
            println!("halted: {}", result.halt.as_str());
            if !result.output.is_empty() {
                println!("output: {}", bytes_to_hex(&result.output));
            }
            println!("pc: {}", result.pc);
            println!("gas used: {}", result.gas_used);
            println!("stack size: {}", result.stack.len());
            if let Some(top) = result.stack.top() {
                println!("top: 0x{:x}", top);
            }
        }
        Err(e) => {
            eprintln!("Execution error: {e}");
            std::process::exit(2);
        }
    }
}
