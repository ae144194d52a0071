//! Fee arithmetic helpers for EIP-1559 transactions

use ethers::types::U256;

/// Compute the gas fee cap for a transaction:
/// `gas_fee_cap = gas_tip_cap + 2 * base_fee`.
///
/// Doubling the base fee keeps the cap valid across consecutive
/// maximum-increase blocks while the tip rides on top.
pub fn calc_gas_fee_cap(base_fee: U256, gas_tip_cap: U256) -> U256 {
    gas_tip_cap + base_fee * 2
}

/// Scale both fee fields by `percent` (e.g. 125 = +25%). Rebuild hooks use
/// this to price replacement variants above the ones already in the mempool.
pub fn bump_fees(gas_fee_cap: U256, gas_tip_cap: U256, percent: u64) -> (U256, U256) {
    (
        gas_fee_cap * percent / 100,
        gas_tip_cap * percent / 100,
    )
}
