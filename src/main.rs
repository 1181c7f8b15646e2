use log::info;

use edu_ledger::blockchain::{CryptoContext, Wallet};

// Generates a fresh secp256k1 key pair and prints it. The public key doubles
// as the wallet address on the ledger.
fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let ctx = CryptoContext::new();
    let wallet = Wallet::generate(&ctx);
    info!("Generated key pair for address {}", wallet.address());

    let rule = "=".repeat(143);
    println!();
    println!("Generated Key Summary:");
    println!();
    println!("{rule}");
    println!("Public Key: {}", wallet.public_key_hex());
    println!();
    println!("Private Key (secret): {}", wallet.secret_key_hex());
    println!("{rule}");

    // The printed secret must load back into the same wallet
    let restored = Wallet::from_secret_hex(&ctx, &wallet.secret_key_hex())?;
    anyhow::ensure!(
        restored.address() == wallet.address(),
        "restored key does not match generated address"
    );

    Ok(())
}
