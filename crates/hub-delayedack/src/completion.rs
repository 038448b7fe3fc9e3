//! Completion hooks: follow-up actions run when an order's funds land.
//!
//! A transfer memo may name a registered hook to run once the recipient has
//! been paid, either immediately at fulfillment or after finalization for
//! orders nobody fulfilled. Hooks are executed at most once per order.

use async_trait::async_trait;

use hub_types::coin::Coin;
use hub_types::hooks::CompletionHookCall;
use hub_types::order::DemandOrder;
use hub_types::traits::ModuleError;

use crate::keeper::DelayedAckKeeper;
use crate::DelayedAckError;

/// A registered completion handler. The hook data comes straight from the
/// transfer memo, so `validate_arg` runs before any order is created with it.
#[async_trait]
pub trait CompletionHook: Send + Sync {
	fn validate_arg(&self, hook_data: &[u8]) -> Result<(), ModuleError>;

	/// Runs the hook with `budget` available at `funds_src`.
	async fn run(
		&self,
		funds_src: &str,
		budget: &Coin,
		hook_data: &[u8],
	) -> Result<(), ModuleError>;
}

impl DelayedAckKeeper {
	/// Checks that the call names a registered hook and that the hook accepts
	/// the data. Assumes the call already passed basic validation.
	pub fn validate_completion_hook(&self, call: &CompletionHookCall) -> Result<(), DelayedAckError> {
		let hooks = self.completion_hooks()?;
		let hook = hooks
			.get(&call.name)
			.ok_or_else(|| DelayedAckError::HookNotRegistered(call.name.clone()))?;
		hook.validate_arg(&call.data)?;
		Ok(())
	}

	/// Runs the order's completion hook with the given budget, sourced from
	/// the order's recipient.
	pub async fn run_order_completion_hook(
		&self,
		order: &DemandOrder,
		amount: u128,
	) -> Result<(), DelayedAckError> {
		let call = match &order.completion_hook {
			Some(call) => call.clone(),
			None => return Ok(()),
		};
		let budget = Coin::new(order.denom(), amount);
		self.run_completion_hook(&order.recipient, &budget, &call).await
	}

	pub async fn run_completion_hook(
		&self,
		funds_src: &str,
		budget: &Coin,
		call: &CompletionHookCall,
	) -> Result<(), DelayedAckError> {
		let hook = {
			let hooks = self.completion_hooks()?;
			hooks
				.get(&call.name)
				.cloned()
				.ok_or_else(|| DelayedAckError::HookNotRegistered(call.name.clone()))?
		};
		hook.run(funds_src, budget, &call.data).await?;
		Ok(())
	}
}
