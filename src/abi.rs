// src/abi.rs
//! Contract interfaces shared by the log decoder and the tip call builder.
use alloy::sol;

sol! {
    /// TipJar with platform fees and a token allow-list.
    interface ITipJar {
        event TipSent(
            address indexed tipper,
            address indexed creator,
            address indexed token,
            uint256 amount,
            uint256 fee,
            string message,
            uint256 timestamp
        );
        event CreatorWithdrawal(
            address indexed creator,
            address indexed token,
            uint256 amount,
            uint256 timestamp
        );
        event TokenAdded(address indexed token, uint256 minTipAmount);
        event TokenRemoved(address indexed token);
        event PlatformFeeUpdated(uint256 oldFee, uint256 newFee);

        function tipETH(address creator, string message) external payable;
        function tipToken(address creator, address token, uint256 amount, string message) external;
    }
}

sol! {
    /// Fee-less SimpleTipJar deployed on the hackathon testnets.
    interface ISimpleTipJar {
        event TipSent(
            address indexed tipper,
            address indexed creator,
            address indexed token,
            uint256 amount,
            string message,
            uint256 timestamp
        );
        event Withdrawal(
            address indexed creator,
            address indexed token,
            uint256 amount,
            uint256 timestamp
        );
    }
}

sol! {
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
    }
}
