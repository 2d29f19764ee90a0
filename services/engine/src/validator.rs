//! Business validation
//!
//! Runs before any mutation. A failure here rejects the instruction with a
//! specific status code and leaves every entity untouched.

use ledger::WalletRegistry;
use types::asset::{AssetRegistry, InstrumentRegistry};
use types::errors::ValidationError;
use types::instruction::{BalanceUpdate, CashOperation, MassCancel, PlaceOrder};
use types::numeric::{Price, Volume};

use rust_decimal::Decimal;

/// Validate a cash in/out instruction.
///
/// Checks performed (in order):
/// 1. Asset exists and is enabled
/// 2. Amount is non-zero
/// 3. A debit is covered by the current balance
pub fn validate_cash_operation(
    assets: &AssetRegistry,
    wallets: &WalletRegistry,
    cash: &CashOperation,
) -> Result<(), ValidationError> {
    let asset = assets
        .get(&cash.asset_id)
        .ok_or_else(|| ValidationError::UnknownAsset(cash.asset_id.clone()))?;
    if !asset.enabled {
        return Err(ValidationError::DisabledAsset(cash.asset_id.clone()));
    }

    if cash.amount.is_zero() {
        return Err(ValidationError::InvalidVolume(cash.amount));
    }

    if cash.amount < Decimal::ZERO {
        let available = wallets.balance(&cash.client_id, &cash.asset_id);
        let required = -cash.amount;
        if required > available {
            return Err(ValidationError::NotEnoughFunds {
                client_id: cash.client_id,
                asset_id: cash.asset_id.clone(),
                available,
                required,
            });
        }
    }

    Ok(())
}

/// Validate a limit order instruction, returning the typed price and volume.
pub fn validate_place_order(
    instruments: &InstrumentRegistry,
    place: &PlaceOrder,
) -> Result<(Price, Volume), ValidationError> {
    let instrument = instruments
        .get(&place.instrument_id)
        .ok_or_else(|| ValidationError::UnknownInstrument(place.instrument_id.clone()))?;

    let price =
        Price::try_new(place.price).ok_or(ValidationError::InvalidPrice(place.price))?;
    let volume = Volume::try_new(place.volume)
        .filter(|volume| !volume.is_zero())
        .ok_or(ValidationError::InvalidVolume(place.volume))?;

    if let Some(min_volume) = instrument.min_volume {
        if place.volume < min_volume {
            return Err(ValidationError::TooSmallVolume {
                volume: place.volume,
                min_volume,
            });
        }
    }

    Ok((price, volume))
}

/// Validate a multi-cancel instruction.
pub fn validate_mass_cancel(
    instruments: &InstrumentRegistry,
    mass_cancel: &MassCancel,
) -> Result<(), ValidationError> {
    instruments
        .get(&mass_cancel.instrument_id)
        .map(|_| ())
        .ok_or_else(|| ValidationError::UnknownInstrument(mass_cancel.instrument_id.clone()))
}

/// Validate an absolute balance overwrite.
pub fn validate_balance_update(
    assets: &AssetRegistry,
    update: &BalanceUpdate,
) -> Result<(), ValidationError> {
    assets
        .get(&update.asset_id)
        .ok_or_else(|| ValidationError::UnknownAsset(update.asset_id.clone()))?;

    if update.amount < Decimal::ZERO {
        return Err(ValidationError::NegativeBalance(update.amount));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use types::asset::{Asset, Instrument};
    use types::ids::{AssetId, ClientId, InstrumentId, MessageId};
    use types::instruction::InstructionStatus;
    use types::order::Side;

    fn assets() -> AssetRegistry {
        let mut registry = AssetRegistry::new();
        registry.insert(Asset::new(AssetId::new("BTC"), 8));
        let mut disabled = Asset::new(AssetId::new("OLD"), 2);
        disabled.enabled = false;
        registry.insert(disabled);
        registry
    }

    fn instruments() -> InstrumentRegistry {
        let mut registry = InstrumentRegistry::new();
        registry.insert(
            Instrument::new(InstrumentId::new("BTC/USDT"), 2).with_min_volume(dec!(0.001)),
        );
        registry
    }

    fn cash(asset: &str, amount: Decimal) -> CashOperation {
        CashOperation {
            message_id: MessageId::new(),
            business_id: None,
            client_id: ClientId::new(),
            asset_id: AssetId::new(asset),
            amount,
            timestamp: 0,
        }
    }

    #[test]
    fn test_cash_unknown_asset() {
        let err =
            validate_cash_operation(&assets(), &WalletRegistry::new(), &cash("DOGE", dec!(1)))
                .unwrap_err();
        assert_eq!(err.status(), InstructionStatus::UnknownAsset);
    }

    #[test]
    fn test_cash_disabled_asset() {
        let err =
            validate_cash_operation(&assets(), &WalletRegistry::new(), &cash("OLD", dec!(1)))
                .unwrap_err();
        assert_eq!(err.status(), InstructionStatus::DisabledAsset);
    }

    #[test]
    fn test_cash_zero_amount() {
        let err =
            validate_cash_operation(&assets(), &WalletRegistry::new(), &cash("BTC", dec!(0)))
                .unwrap_err();
        assert_eq!(err.status(), InstructionStatus::InvalidVolume);
    }

    #[test]
    fn test_cash_uncovered_debit() {
        let mut wallets = WalletRegistry::new();
        let instruction = cash("BTC", dec!(-2));
        wallets.set_balance(instruction.client_id, AssetId::new("BTC"), dec!(1));

        let err = validate_cash_operation(&assets(), &wallets, &instruction).unwrap_err();
        assert_eq!(err.status(), InstructionStatus::NotEnoughFunds);
    }

    #[test]
    fn test_cash_covered_debit_passes() {
        let mut wallets = WalletRegistry::new();
        let instruction = cash("BTC", dec!(-2));
        wallets.set_balance(instruction.client_id, AssetId::new("BTC"), dec!(2));

        assert!(validate_cash_operation(&assets(), &wallets, &instruction).is_ok());
    }

    fn place(instrument: &str, price: Decimal, volume: Decimal) -> PlaceOrder {
        PlaceOrder {
            message_id: MessageId::new(),
            client_id: ClientId::new(),
            instrument_id: InstrumentId::new(instrument),
            side: Side::Buy,
            price,
            volume,
            timestamp: 0,
        }
    }

    #[test]
    fn test_place_order_unknown_instrument() {
        let err = validate_place_order(&instruments(), &place("ETH/USDC", dec!(1), dec!(1)))
            .unwrap_err();
        assert_eq!(err.status(), InstructionStatus::UnknownInstrument);
    }

    #[test]
    fn test_place_order_invalid_price_and_volume() {
        let err = validate_place_order(&instruments(), &place("BTC/USDT", dec!(0), dec!(1)))
            .unwrap_err();
        assert_eq!(err.status(), InstructionStatus::BadRequest);

        let err = validate_place_order(&instruments(), &place("BTC/USDT", dec!(1), dec!(-1)))
            .unwrap_err();
        assert_eq!(err.status(), InstructionStatus::InvalidVolume);
    }

    #[test]
    fn test_place_order_min_volume() {
        let err =
            validate_place_order(&instruments(), &place("BTC/USDT", dec!(1), dec!(0.0001)))
                .unwrap_err();
        assert_eq!(err.status(), InstructionStatus::TooSmallVolume);

        let (price, volume) =
            validate_place_order(&instruments(), &place("BTC/USDT", dec!(1), dec!(0.01)))
                .unwrap();
        assert_eq!(price.as_decimal(), dec!(1));
        assert_eq!(volume.as_decimal(), dec!(0.01));
    }

    #[test]
    fn test_balance_update_rejects_negative_target() {
        let update = BalanceUpdate {
            message_id: MessageId::new(),
            client_id: ClientId::new(),
            asset_id: AssetId::new("BTC"),
            amount: dec!(-1),
            timestamp: 0,
        };
        let err = validate_balance_update(&assets(), &update).unwrap_err();
        assert_eq!(err.status(), InstructionStatus::BadRequest);
    }
}
