//! Compile-time contract bindings for the trove protocol and its periphery.
//!
//! Uses `alloy::sol!` with `#[sol(rpc)]` so every interface doubles as a typed
//! call surface. Only the functions and events the monitor actually reads are
//! declared; the on-chain contracts expose more, but keeping the binding
//! surface minimal makes the ABI auditable in one screen.

use alloy::sol;

/// Deployed contract addresses (compile-time constants).
pub mod addresses {
    use alloy::primitives::Address;

    /// Canonical Multicall3 deployment, same address on both chains.
    pub const MULTICALL3: Address =
        alloy::primitives::address!("ca11bde05977b3631167028862be2a173976ca11");

    /// TroveManager — positions, system totals, redemptions.
    pub const TROVE_MANAGER: Address =
        alloy::primitives::address!("94afb503dbca74ac3e4929baceedfce19b93c193");

    /// HintHelpers — redemption hint precomputation.
    pub const HINT_HELPERS: Address =
        alloy::primitives::address!("d267b3be2514375a075fd03c3d9cba6b95317dc3");

    /// SortedTroves — NICR-ordered doubly linked list of troves.
    pub const SORTED_TROVES: Address =
        alloy::primitives::address!("8c5db4c62bf29c1c4564390d10c20a47e0b2749f");

    /// The protocol's stable asset (18 decimals).
    pub const STABLE_TOKEN: Address =
        alloy::primitives::address!("dd468a1ddc392dcdbef6db6e34e89aa338f9f186");

    /// Pool factory for the voting-gauge DEX.
    pub const POOL_FACTORY: Address =
        alloy::primitives::address!("83fe469c636c4081b87ba5b3ae9991c6ed104248");

    /// Voter — gauge registry and vote weights.
    pub const VOTER: Address =
        alloy::primitives::address!("48233ccc97b87ba93bca212cbee48e3210211f03");

    /// Voting escrow — ve supply and historical voting power.
    pub const VOTING_ESCROW: Address =
        alloy::primitives::address!("3d4b1b884a7a1e59fe8589a3296ec8f8cbb6f279");

    /// Bridge custodian holding bridged collateral on the secondary chain.
    pub const BRIDGE_CUSTODIAN: Address =
        alloy::primitives::address!("f6680ea3b480ca2b72d96ea13ccaf2cfd8e6908c");
}

/// `TroveUpdated` operation code emitted by `redeemCollateral`.
pub const OP_REDEEM_COLLATERAL: u8 = 2;

/// On-chain trove status code for an active position.
pub const TROVE_STATUS_ACTIVE: u8 = 1;

sol! {
    #[sol(rpc)]
    interface ITroveManager {
        function priceFeed() external view returns (address feed);
        function getEntireSystemColl() external view returns (uint256 entireSystemColl);
        function getEntireSystemDebt() external view returns (uint256 entireSystemDebt);
        function getTCR(uint256 price) external view returns (uint256 tcr);
        function checkRecoveryMode(uint256 price) external view returns (bool recoveryMode);
        function getTroveOwnersCount() external view returns (uint256 count);
        function getTroveFromTroveOwnersArray(uint256 index) external view returns (address owner);
        function getEntireDebtAndColl(address borrower)
            external
            view
            returns (
                uint256 coll,
                uint256 principal,
                uint256 interest,
                uint256 pendingCollateral,
                uint256 pendingPrincipal,
                uint256 pendingInterest
            );
        function getTroveStatus(address borrower) external view returns (uint256 status);
        function redeemCollateral(
            uint256 amount,
            address firstRedemptionHint,
            address upperPartialRedemptionHint,
            address lowerPartialRedemptionHint,
            uint256 partialRedemptionHintNICR,
            uint256 maxIterations
        ) external;

        event TroveLiquidated(address indexed _borrower, uint256 _debt, uint256 _coll, uint8 operation);
        event Redemption(
            uint256 _attemptedAmount,
            uint256 _actualAmount,
            uint256 _collateralSent,
            uint256 _collateralFee
        );
        event TroveUpdated(
            address indexed _borrower,
            uint256 _principal,
            uint256 _interest,
            uint256 _coll,
            uint256 _stake,
            uint8 operation
        );
    }

    #[sol(rpc)]
    interface IHintHelpers {
        function getRedemptionHints(uint256 amount, uint256 price, uint256 maxIterations)
            external
            view
            returns (
                address firstRedemptionHint,
                uint256 partialRedemptionHintNICR,
                uint256 truncatedAmount
            );
        function getApproxHint(uint256 nicr, uint256 numTrials, uint256 inputRandomSeed)
            external
            view
            returns (address hintAddress, uint256 diff, uint256 latestRandomSeed);
    }

    #[sol(rpc)]
    interface ISortedTroves {
        function findInsertPosition(uint256 nicr, address prevId, address nextId)
            external
            view
            returns (address upperHint, address lowerHint);
    }

    #[sol(rpc)]
    interface IPriceFeed {
        function fetchPrice() external view returns (uint256 price);
    }

    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256 balance);
        function allowance(address owner, address spender) external view returns (uint256 remaining);
        function approve(address spender, uint256 amount) external returns (bool ok);
        function decimals() external view returns (uint8 count);
    }

    #[sol(rpc)]
    interface IPoolFactory {
        function allPoolsLength() external view returns (uint256 length);
        function allPools(uint256 index) external view returns (address pool);
    }

    #[sol(rpc)]
    interface IPool {
        function name() external view returns (string poolName);
    }

    #[sol(rpc)]
    interface IVoter {
        function gauges(address pool) external view returns (address gauge);
        function weights(address pool) external view returns (uint256 weight);
        function gaugeToBribe(address gauge) external view returns (address bribe);
        function totalWeight() external view returns (uint256 weight);
        function epochStart(uint256 timestamp) external view returns (uint256 start);
        function epochNext(uint256 timestamp) external view returns (uint256 next);
        function epochVoteEnd(uint256 timestamp) external view returns (uint256 voteEnd);
    }

    #[sol(rpc)]
    interface IVotingEscrow {
        function totalVotingPower() external view returns (uint256 power);
        function totalVotingPowerAt(uint256 timestamp) external view returns (uint256 power);
    }

    #[sol(rpc)]
    interface IBribeVotingReward {
        function rewardsListLength() external view returns (uint256 length);
        function duration() external view returns (uint256 epochDuration);
        function rewards(uint256 index) external view returns (address token);
        function tokenRewardsPerEpoch(address token, uint256 epochStart)
            external
            view
            returns (uint256 amount);
    }

    #[sol(rpc)]
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls)
            external
            payable
            returns (Result[] memory returnData);
    }
}
