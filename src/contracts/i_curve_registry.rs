use ethers::prelude::*;

abigen!(
    ICurveRegistry,
    r#"[
        function pool_count() external view returns (uint256)
        function pool_list(uint256) external view returns (address)
        function get_coins(address) external view returns (address[8])
        function get_underlying_coins(address) external view returns (address[8])
    ]"#
);
